pub mod anomaly;
pub mod clustree;
pub mod common;
pub mod datasets;
pub mod metrics;
pub mod stream;
