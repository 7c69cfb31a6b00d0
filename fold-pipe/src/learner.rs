//! The narrow interface to the learning layer.
//!
//! Pipelines hand finished batches to a [`Learner`] and never call back into
//! it otherwise. No model lives in this crate; [`LabelTally`] only keeps
//! bookkeeping so drivers and tests can see what a learner was given.

use std::collections::BTreeMap;

use instance_pipes::{InstanceCollection, Label};

/// Consumer of instance batches.
pub trait Learner {
    /// Train on one bounded batch.
    fn train(&mut self, batch: &InstanceCollection);

    /// Observe one held-out batch. Ignored unless overridden.
    fn test(&mut self, _batch: &InstanceCollection) {}
}

/// Label histogram over the training and held-out batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTally {
    pub train_labels: BTreeMap<String, usize>,
    pub test_labels: BTreeMap<String, usize>,
    pub train_weight: f64,
    pub batches: usize,
}

impl LabelTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn train_count(&self) -> usize {
        self.train_labels.values().sum()
    }

    pub fn test_count(&self) -> usize {
        self.test_labels.values().sum()
    }

    fn tally(counts: &mut BTreeMap<String, usize>, batch: &InstanceCollection) {
        for instance in batch {
            *counts
                .entry(Label::Number(instance.label).to_string())
                .or_default() += 1;
        }
    }
}

impl Learner for LabelTally {
    fn train(&mut self, batch: &InstanceCollection) {
        Self::tally(&mut self.train_labels, batch);
        self.train_weight += batch.total_weight();
        self.batches += 1;
    }

    fn test(&mut self, batch: &InstanceCollection) {
        Self::tally(&mut self.test_labels, batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instance_pipes::{FeatureVector, Instance, Layout};

    fn batch(labels: &[f64]) -> InstanceCollection {
        labels
            .iter()
            .map(|l| Instance::new(FeatureVector::zeros(1, Layout::Sparse), *l))
            .collect()
    }

    #[test]
    fn test_tally_counts_labels() {
        let mut tally = LabelTally::new();
        tally.train(&batch(&[1.0, -1.0, 1.0]));
        tally.train(&batch(&[1.0]));
        tally.test(&batch(&[-1.0]));
        assert_eq!(tally.train_labels.get("1"), Some(&3));
        assert_eq!(tally.train_labels.get("-1"), Some(&1));
        assert_eq!(tally.train_count(), 4);
        assert_eq!(tally.test_count(), 1);
        assert_eq!(tally.batches, 2);
        assert_eq!(tally.train_weight, 4.0);
    }
}
