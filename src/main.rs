use std::fs::File;
use std::time::SystemTime;

use csv::WriterBuilder;

use anyout::anomaly::confidence::ConfidenceCombination;
use anyout::anomaly::detector::{AnyOut, AnyOutParams};
use anyout::common::Label;
use anyout::datasets::synthetic::SyntheticOutliers;

fn main() {
    env_logger::init();

    // Create a CSV writer for the per-object scores
    let file = File::create("scores.csv");
    let mut csv_writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(file.unwrap());

    // PARAMETERS

    let n_objects: usize = 5000;
    let params: AnyOutParams<f64> = AnyOutParams {
        window_size: 250,
        training_set_size: 500,
        confidence_choice: ConfidenceCombination::from_choice(2).unwrap(),
        outlier_label: Some(Label::Int(1)),
        ..AnyOutParams::default()
    };

    // INITIALIZATION

    let mut detector: AnyOut<f64> = AnyOut::new(params);

    // LOOP
    // The stream is materialized up front so reading time stays out of the
    // measurement.
    let dataset: Vec<_> = SyntheticOutliers::new(2, 0.02, 42).take(n_objects).collect();

    let start = SystemTime::now();
    for (features, label) in dataset {
        let id = detector.process_one(features, label).unwrap();
        if let Some(score) = detector.outlier_score(id) {
            let _ = csv_writer.serialize(score);
        }
    }
    let _ = csv_writer.flush();

    println!("{}", detector.stats());
    println!("Outliers currently in window: {}", detector.outliers().len());

    match start.elapsed() {
        Ok(elapsed) => {
            println!("Total process time: {} ms", elapsed.as_millis());
        }
        Err(e) => {
            println!("Error: {e:?}");
        }
    }
}
