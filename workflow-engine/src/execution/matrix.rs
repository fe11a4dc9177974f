// Matrix Expansion
// Cross-multiplies matrix axes into concrete job instances

use crate::parser::models::{Strategy, Value};

use std::collections::BTreeMap;

/// One assignment of matrix axis values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixInstance {
    /// Axis name -> assigned value
    pub values: BTreeMap<String, Value>,
}

impl MatrixInstance {
    /// Human-readable label: "linux, 3.9" in axis-name order.
    /// Empty for the single instance of a matrix-less job.
    pub fn label(&self) -> String {
        self.values
            .values()
            .map(Value::as_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Expander for job strategies
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a job's strategy into matrix instances.
    ///
    /// Instances are the cross product of all axes, axis names in sorted
    /// order, values in declared order. A job without a matrix (or with an
    /// empty one) yields exactly one instance.
    pub fn expand(strategy: Option<&Strategy>) -> Vec<MatrixInstance> {
        let matrix = match strategy.and_then(|s| s.matrix.as_ref()) {
            Some(matrix) if !matrix.is_empty() => matrix,
            _ => return vec![MatrixInstance::default()],
        };

        let mut instances = vec![MatrixInstance::default()];

        for (axis, axis_values) in matrix {
            let mut expanded = Vec::with_capacity(instances.len() * axis_values.len());
            for instance in &instances {
                for value in axis_values {
                    let mut next = instance.clone();
                    next.values.insert(axis.clone(), value.clone());
                    expanded.push(next);
                }
            }
            instances = expanded;
        }

        instances
    }

    /// Cap on concurrently running instances, if the strategy sets one
    pub fn max_parallel(strategy: Option<&Strategy>) -> Option<u32> {
        strategy.and_then(|s| s.max_parallel)
    }

    /// Whether a failing instance cancels not-yet-started siblings
    pub fn fail_fast(strategy: Option<&Strategy>) -> bool {
        strategy.map(|s| s.fail_fast).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_strategy(axes: &[(&str, &[&str])]) -> Strategy {
        let matrix = axes
            .iter()
            .map(|(axis, values)| {
                (
                    axis.to_string(),
                    values.iter().map(|v| Value::from(*v)).collect(),
                )
            })
            .collect();
        Strategy {
            matrix: Some(matrix),
            ..Default::default()
        }
    }

    #[test]
    fn test_cross_product_count() {
        let strategy = matrix_strategy(&[
            ("os", &["linux", "macos"][..]),
            ("python", &["3.9", "3.10", "3.11"][..]),
        ]);

        let instances = MatrixExpander::expand(Some(&strategy));
        assert_eq!(instances.len(), 6);

        // Every combination appears exactly once
        let labels: Vec<String> = instances.iter().map(|i| i.label()).collect();
        assert!(labels.contains(&"linux, 3.9".to_string()));
        assert!(labels.contains(&"macos, 3.11".to_string()));
        let mut deduped = labels.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 6);
    }

    #[test]
    fn test_no_matrix_yields_one_instance() {
        assert_eq!(MatrixExpander::expand(None).len(), 1);

        let empty = Strategy {
            matrix: Some(BTreeMap::new()),
            ..Default::default()
        };
        let instances = MatrixExpander::expand(Some(&empty));
        assert_eq!(instances.len(), 1);
        assert!(instances[0].values.is_empty());
        assert_eq!(instances[0].label(), "");
    }

    #[test]
    fn test_single_axis() {
        let strategy = matrix_strategy(&[("os", &["linux", "windows"][..])]);
        let instances = MatrixExpander::expand(Some(&strategy));

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].values["os"], Value::from("linux"));
        assert_eq!(instances[1].values["os"], Value::from("windows"));
    }

    #[test]
    fn test_deterministic_ordering() {
        // Axes iterate in name order regardless of declaration order, so two
        // expansions of the same matrix always agree.
        let strategy = matrix_strategy(&[
            ("ver", &["1", "2"][..]),
            ("arch", &["x86", "arm"][..]),
        ]);

        let first = MatrixExpander::expand(Some(&strategy));
        let second = MatrixExpander::expand(Some(&strategy));
        assert_eq!(first, second);
        assert_eq!(first[0].label(), "x86, 1");
    }

    #[test]
    fn test_strategy_accessors() {
        let strategy = Strategy {
            fail_fast: true,
            max_parallel: Some(3),
            ..Default::default()
        };
        assert!(MatrixExpander::fail_fast(Some(&strategy)));
        assert_eq!(MatrixExpander::max_parallel(Some(&strategy)), Some(3));
        assert!(!MatrixExpander::fail_fast(None));
        assert_eq!(MatrixExpander::max_parallel(None), None);
    }
}
