use std::collections::{HashMap, HashSet};

use ndarray::Array1;
use num::{Float, ToPrimitive};

use crate::common::Label;

/// This enum allows you to choose whether to define a single target (Name) or multiple targets (MultipleNames).
/// # Example
/// ```
/// use anyout::stream::data_stream::Target;
/// use anyout::stream::iter_csv::IterCsv;
/// // This import makes it easier to create HashSets using a macro,
/// // but you can still create a HashSet in the traditional way even if you choose not to use this import.
/// use maplit::hashset;
///
/// let content = "Name,Height,Weight,Score\nAlice,1.6,60.0,90.0\nBob,1.8,80.0,85.0";
/// // Single target
/// IterCsv::<f32, &[u8]>::new(content.as_bytes(), Some(Target::Name("Score".to_string())));
/// // Multiple targets
/// IterCsv::<f32, &[u8]>::new(content.as_bytes(), Some(Target::MultipleNames(hashset! {"Height".to_string(), "Weight".to_string()})));
/// ```
pub enum Target {
    Name(String),
    MultipleNames(HashSet<String>),
}

impl Target {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Target::Name(n) => n == name,
            Target::MultipleNames(names) => names.contains(&name.to_string()),
        }
    }
}

/// This enum allows you to have two types of data for your observation and targets: either a scalar or a string.
/// # Example
/// ```
/// use anyout::stream::data_stream::Data;
///
/// let scalar = Data::<f32>::Scalar(1.6);
/// let string = Data::<f32>::String("age".to_string());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Data<F: Float + std::str::FromStr> {
    Scalar(F),
    String(String),
}

/// This enum defines whether your DataStream only contains observations (X) or both observations and one or more targets (XY).
pub enum DataStream<F: Float + std::str::FromStr> {
    X(HashMap<String, Data<F>>),
    XY(HashMap<String, Data<F>>, HashMap<String, Data<F>>),
}

impl<F: Float + std::str::FromStr> DataStream<F> {
    pub fn get_x(&self) -> &HashMap<String, Data<F>> {
        match self {
            DataStream::X(x) => x,
            DataStream::XY(x, _) => x,
        }
    }

    pub fn get_y(&self) -> Result<&HashMap<String, Data<F>>, &str> {
        match self {
            DataStream::X(_) => Err("No y data"),
            DataStream::XY(_, y) => Ok(y),
        }
    }

    /// Flatten one row into the dense form the detector ingests: the feature
    /// values in the given column order (missing or non-scalar columns become
    /// zero) and the target, if any, as a label. Numeric targets are rounded
    /// into integer labels.
    pub fn to_dense(&self, columns: &[String]) -> (Array1<F>, Option<Label>) {
        let x = self.get_x();
        let features = columns
            .iter()
            .map(|name| match x.get(name) {
                Some(Data::Scalar(value)) => *value,
                _ => F::zero(),
            })
            .collect::<Vec<F>>();
        let label = match self {
            DataStream::X(_) => None,
            DataStream::XY(_, y) => y.values().next().map(|value| match value {
                Data::Scalar(v) => Label::Int(v.to_i32().unwrap_or(0)),
                Data::String(s) => Label::String(s.clone()),
            }),
        };
        (Array1::from_vec(features), label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_contains() {
        let single = Target::Name("Score".to_string());
        assert!(single.contains("Score"));
        assert!(!single.contains("Height"));
    }

    #[test]
    fn test_to_dense_orders_features() {
        let mut x = HashMap::new();
        x.insert("a".to_string(), Data::Scalar(1.0f64));
        x.insert("b".to_string(), Data::Scalar(2.0f64));
        let mut y = HashMap::new();
        y.insert("label".to_string(), Data::Scalar(1.0f64));
        let row = DataStream::XY(x, y);

        let columns = vec!["b".to_string(), "a".to_string(), "missing".to_string()];
        let (features, label) = row.to_dense(&columns);
        assert_eq!(features, Array1::from_vec(vec![2.0, 1.0, 0.0]));
        assert_eq!(label, Some(Label::Int(1)));
    }

    #[test]
    fn test_to_dense_without_targets() {
        let mut x = HashMap::new();
        x.insert("a".to_string(), Data::Scalar(3.5f64));
        let row = DataStream::X(x);
        let (features, label) = row.to_dense(&["a".to_string()]);
        assert_eq!(features[0], 3.5);
        assert_eq!(label, None);
    }
}
