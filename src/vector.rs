//! Numeric feature vectors filled in by the parsing stages.
//!
//! Only the narrow interface the parsers need lives here: indexed reads and
//! writes, the stored entries, and the dimension. Arithmetic belongs to the
//! learning layer.

use std::collections::BTreeMap;

/// Storage layout requested from a parsing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Dense,
    Sparse,
}

/// A fixed-dimension vector of `f64` features.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureVector {
    Dense(Vec<f64>),
    /// Entries not present are zero.
    Sparse {
        dimension: usize,
        entries: BTreeMap<usize, f64>,
    },
}

impl FeatureVector {
    /// An all-zero vector of the given dimension and layout.
    pub fn zeros(dimension: usize, layout: Layout) -> Self {
        match layout {
            Layout::Dense => FeatureVector::Dense(vec![0.0; dimension]),
            Layout::Sparse => FeatureVector::Sparse {
                dimension,
                entries: BTreeMap::new(),
            },
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            FeatureVector::Dense(values) => values.len(),
            FeatureVector::Sparse { dimension, .. } => *dimension,
        }
    }

    /// Value at `index`; zero for absent sparse entries and out-of-range reads.
    pub fn get(&self, index: usize) -> f64 {
        match self {
            FeatureVector::Dense(values) => values.get(index).copied().unwrap_or(0.0),
            FeatureVector::Sparse { entries, .. } => entries.get(&index).copied().unwrap_or(0.0),
        }
    }

    /// Store `value` at `index`. Returns false, leaving the vector unchanged,
    /// when `index` is outside the dimension.
    pub fn set(&mut self, index: usize, value: f64) -> bool {
        match self {
            FeatureVector::Dense(values) => match values.get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            FeatureVector::Sparse { dimension, entries } => {
                if index >= *dimension {
                    return false;
                }
                if value == 0.0 {
                    entries.remove(&index);
                } else {
                    entries.insert(index, value);
                }
                true
            }
        }
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        match self {
            FeatureVector::Dense(values) => values.iter().filter(|v| **v != 0.0).count(),
            FeatureVector::Sparse { entries, .. } => entries.len(),
        }
    }

    /// Non-zero entries in index order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (usize, f64)> + '_> {
        match self {
            FeatureVector::Dense(values) => Box::new(
                values
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(_, v)| *v != 0.0),
            ),
            FeatureVector::Sparse { entries, .. } => {
                Box::new(entries.iter().map(|(i, v)| (*i, *v)))
            }
        }
    }

    /// Dense copy of the values.
    pub fn to_dense(&self) -> Vec<f64> {
        match self {
            FeatureVector::Dense(values) => values.clone(),
            FeatureVector::Sparse { dimension, entries } => {
                let mut values = vec![0.0; *dimension];
                for (i, v) in entries {
                    values[*i] = *v;
                }
                values
            }
        }
    }
}
