//! Labeled training instances handed to the learning layer.

use crate::envelope::Label;
use crate::vector::FeatureVector;

/// A labeled feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub features: FeatureVector,
    pub label: f64,
    pub weight: f64,
    pub identifier: Option<String>,
}

impl Instance {
    pub fn new(features: FeatureVector, label: f64) -> Self {
        Self {
            features,
            label,
            weight: crate::envelope::DEFAULT_WEIGHT,
            identifier: None,
        }
    }

    /// Binary class of the label: positive labels are `true`.
    pub fn is_positive(&self) -> bool {
        self.label > 0.0
    }

    /// Render as a sparse-text line: `label idx:val idx:val ...`.
    pub fn to_sparse_line(&self) -> String {
        let mut line = Label::Number(self.label).to_string();
        for (index, value) in self.features.iter() {
            line.push(' ');
            line.push_str(&format!("{index}:{value}"));
        }
        line
    }
}

/// A bounded collection of instances, the unit a learner trains on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceCollection {
    instances: Vec<Instance>,
}

impl InstanceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            instances: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    /// Largest feature dimension among the members.
    pub fn dimension(&self) -> usize {
        self.instances
            .iter()
            .map(|i| i.features.dimension())
            .max()
            .unwrap_or(0)
    }

    /// Sum of member weights.
    pub fn total_weight(&self) -> f64 {
        self.instances.iter().map(|i| i.weight).sum()
    }
}

impl FromIterator<Instance> for InstanceCollection {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        Self {
            instances: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for InstanceCollection {
    type Item = Instance;
    type IntoIter = std::vec::IntoIter<Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.into_iter()
    }
}

impl<'a> IntoIterator for &'a InstanceCollection {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Layout;

    fn instance(label: f64, dim: usize) -> Instance {
        let mut v = FeatureVector::zeros(dim, Layout::Sparse);
        v.set(0, 1.0);
        Instance::new(v, label)
    }

    #[test]
    fn test_sparse_line_rendering() {
        let mut v = FeatureVector::zeros(16, Layout::Sparse);
        v.set(3, 0.5);
        v.set(7, 1.0);
        let inst = Instance::new(v, -1.0);
        assert_eq!(inst.to_sparse_line(), "-1 3:0.5 7:1");
        assert!(!inst.is_positive());
    }

    #[test]
    fn test_collection_stats() {
        let mut batch: InstanceCollection = vec![instance(1.0, 4), instance(-1.0, 8)]
            .into_iter()
            .collect();
        batch.push(Instance {
            weight: 2.0,
            ..instance(1.0, 2)
        });
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.dimension(), 8);
        assert_eq!(batch.total_weight(), 4.0);
        assert_eq!(batch.iter().filter(|i| i.is_positive()).count(), 2);
    }

    #[test]
    fn test_empty_collection() {
        let batch = InstanceCollection::new();
        assert!(batch.is_empty());
        assert_eq!(batch.dimension(), 0);
    }
}
