//! INSTANCE and WEIGHT stages.

use std::marker::PhantomData;

use crate::envelope::Envelope;
use crate::error::{PipeError, Result};
use crate::instance::Instance;
use crate::stage::Stage;
use crate::vector::FeatureVector;

/// Turns a labeled feature vector into an [`Instance`].
///
/// The envelope label must be numeric, or text holding a number; map text
/// classes through a `Relabel` stage first. Identifier and weight are copied
/// onto the instance and also stay on the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToInstance;

impl ToInstance {
    pub fn new() -> Self {
        ToInstance
    }
}

impl Stage for ToInstance {
    type In = FeatureVector;
    type Out = Instance;

    fn name(&self) -> &str {
        "INSTANCE"
    }

    fn operate(&self, envelope: Envelope<FeatureVector>) -> Result<Envelope<Instance>> {
        let label = match envelope.label() {
            Some(label) => label.as_number().ok_or_else(|| PipeError::UnknownLabel {
                key: label.key(),
            })?,
            None => {
                return Err(PipeError::UnknownLabel {
                    key: String::new(),
                });
            }
        };
        let weight = envelope.weight();
        let identifier = envelope.identifier().map(str::to_string);
        Ok(envelope.map(|features| Instance {
            features,
            label,
            weight,
            identifier,
        }))
    }
}

/// Assigns a fixed importance weight, leaving the payload alone.
pub struct SetWeight<T> {
    weight: f64,
    _payload: PhantomData<fn(T)>,
}

impl<T> SetWeight<T> {
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            _payload: PhantomData,
        }
    }
}

impl<T> Stage for SetWeight<T> {
    type In = T;
    type Out = T;

    fn name(&self) -> &str {
        "WEIGHT"
    }

    fn operate(&self, envelope: Envelope<T>) -> Result<Envelope<T>> {
        Ok(envelope.with_weight(self.weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Label;

    #[test]
    fn test_numeric_label_becomes_instance() {
        let env = Envelope::new(FeatureVector::Dense(vec![1.0, 0.0]))
            .with_label("-1")
            .with_identifier("17")
            .with_weight(3.0);
        let out = ToInstance.operate(env).unwrap();
        let inst = out.payload();
        assert_eq!(inst.label, -1.0);
        assert_eq!(inst.weight, 3.0);
        assert_eq!(inst.identifier.as_deref(), Some("17"));
        assert_eq!(out.label(), Some(&Label::from("-1")));
    }

    #[test]
    fn test_text_label_is_unknown() {
        let env = Envelope::new(FeatureVector::Dense(vec![])).with_label("Iris-setosa");
        match ToInstance.operate(env).unwrap_err() {
            PipeError::UnknownLabel { key } => assert_eq!(key, "Iris-setosa"),
            other => panic!("Expected UnknownLabel, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_label_is_unknown() {
        let env = Envelope::new(FeatureVector::Dense(vec![]));
        assert!(matches!(
            ToInstance.operate(env),
            Err(PipeError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn test_set_weight_only_touches_weight() {
        let env = Envelope::new("x".to_string()).with_label(1.0).with_identifier("a");
        let out = SetWeight::new(0.1).operate(env.clone()).unwrap();
        assert_eq!(out.weight(), 0.1);
        assert_eq!(out.payload(), env.payload());
        assert_eq!(out.label(), env.label());
        assert_eq!(out.identifier(), env.identifier());
    }
}
