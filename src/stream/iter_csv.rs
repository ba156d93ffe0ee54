use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::marker::PhantomData;
use std::path::Path;

use csv::{self, Reader, ReaderBuilder};
use num::Float;

use super::data_stream::{Data, DataStream, Target};

/// Iterator over the rows of a headered CSV source, splitting each row into
/// observation columns and the configured target columns. Fields that do not
/// parse as numbers come through as strings.
pub struct IterCsv<F: Float + std::str::FromStr, R: std::io::Read> {
    reader: Reader<R>,
    headers: csv::StringRecord,
    y_cols: Option<Target>,
    marker: PhantomData<F>,
}

impl<F: Float + std::str::FromStr, R: std::io::Read> IterCsv<F, R> {
    pub fn new(reader: R, y_cols: Option<Target>) -> Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.to_owned();
        Ok(Self {
            reader,
            headers,
            y_cols,
            marker: PhantomData,
        })
    }

    /// Feature column names, i.e. the headers that are not targets. The order
    /// is stable across rows, which makes it usable for `to_dense`.
    pub fn feature_columns(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|header| match &self.y_cols {
                Some(target) => !target.contains(header),
                None => true,
            })
            .map(|header| header.to_string())
            .collect()
    }
}

impl<F: Float + std::str::FromStr> IterCsv<F, BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, y_cols: Option<Target>) -> Result<Self, csv::Error> {
        let file = File::open(path)?;
        IterCsv::new(BufReader::new(file), y_cols)
    }
}

impl<F: Float + std::str::FromStr, R: std::io::Read> Iterator for IterCsv<F, R> {
    type Item = Result<DataStream<F>, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.reader.records().next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        let parse = |field: &str| match field.parse::<F>() {
            Ok(value) => Data::Scalar(value),
            Err(_) => Data::String(field.to_string()),
        };

        let mut x_data: HashMap<String, Data<F>> = HashMap::new();
        let mut y_data: HashMap<String, Data<F>> = HashMap::new();
        for (header, field) in self.headers.iter().zip(record.iter()) {
            let is_target = self
                .y_cols
                .as_ref()
                .map(|target| target.contains(header))
                .unwrap_or(false);
            if is_target {
                y_data.insert(header.to_string(), parse(field));
            } else {
                x_data.insert(header.to_string(), parse(field));
            }
        }

        Some(Ok(if self.y_cols.is_some() {
            DataStream::XY(x_data, y_data)
        } else {
            DataStream::X(x_data)
        }))
    }
}
