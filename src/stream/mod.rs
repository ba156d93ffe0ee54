pub mod data_stream;
pub mod iter_csv;
