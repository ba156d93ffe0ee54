pub mod confidence;
pub mod detector;
pub mod scorer;
pub mod training;
pub mod window;

pub use confidence::ConfidenceCombination;
pub use detector::{AnyOut, AnyOutParams};
pub use scorer::{DepthPolicy, ScoreFunction};
pub use window::{NoopObserver, OutlierObserver};
