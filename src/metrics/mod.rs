pub mod detection;

pub use detection::DetectionStats;
