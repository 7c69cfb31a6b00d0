//! Label stages: LABEL lifts a label out of a token row, RELABEL maps labels
//! through a lookup table.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::envelope::{Envelope, Label};
use crate::error::{PipeError, Result};
use crate::stage::Stage;

/// Lookup table from label keys to labels, with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    entries: HashMap<String, Label>,
    default: Option<Label>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, label: impl Into<Label>) -> Self {
        self.entries.insert(key.into(), label.into());
        self
    }

    pub fn with_default(mut self, label: impl Into<Label>) -> Self {
        self.default = Some(label.into());
        self
    }

    /// Parse `key=value;key=value`. Numeric values become numeric labels.
    pub fn parse(table: &str) -> std::result::Result<Self, String> {
        let mut map = LabelMap::new();
        for pair in table.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("label mapping '{pair}' requires key=value"))?;
            map = map.insert(key.trim(), parse_label_value(value.trim()));
        }
        if map.entries.is_empty() {
            return Err("label map requires at least one key=value pair".to_string());
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look `key` up, falling back to the default.
    pub fn resolve(&self, key: &str) -> Result<Label> {
        self.entries
            .get(key)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| PipeError::UnknownLabel {
                key: key.to_string(),
            })
    }
}

/// A label value as written in a description: a number if it parses as one.
pub fn parse_label_value(value: &str) -> Label {
    value
        .parse::<f64>()
        .map(Label::Number)
        .unwrap_or_else(|_| Label::Text(value.to_string()))
}

type KeyFn<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Rewrites the envelope label through a [`LabelMap`].
///
/// By default the lookup key is the current label. [`Relabel::keyed_by`]
/// extracts the key from the payload instead. A missing key or a key absent
/// from the map with no default fails with `PipeError::UnknownLabel`.
pub struct Relabel<T> {
    map: LabelMap,
    key: Option<KeyFn<T>>,
    _payload: PhantomData<fn(T)>,
}

impl<T> Relabel<T> {
    pub fn new(map: LabelMap) -> Self {
        Self {
            map,
            key: None,
            _payload: PhantomData,
        }
    }

    pub fn keyed_by(mut self, key: impl Fn(&T) -> Option<String> + Send + Sync + 'static) -> Self {
        self.key = Some(Arc::new(key));
        self
    }
}

impl<T> Stage for Relabel<T> {
    type In = T;
    type Out = T;

    fn name(&self) -> &str {
        "RELABEL"
    }

    fn operate(&self, envelope: Envelope<T>) -> Result<Envelope<T>> {
        let key = match &self.key {
            Some(extract) => extract(envelope.payload()),
            None => envelope.label().map(Label::key),
        };
        let label = self.map.resolve(key.as_deref().unwrap_or(""))?;
        Ok(envelope.with_label(label))
    }
}

/// Moves one token of a token row onto the envelope label.
#[derive(Debug, Clone, Copy)]
pub struct LiftLabel {
    column: Option<usize>,
}

impl LiftLabel {
    /// Take the last token.
    pub fn last() -> Self {
        Self { column: None }
    }

    pub fn at(column: usize) -> Self {
        Self {
            column: Some(column),
        }
    }
}

impl Stage for LiftLabel {
    type In = Vec<String>;
    type Out = Vec<String>;

    fn name(&self) -> &str {
        "LABEL"
    }

    fn operate(&self, envelope: Envelope<Vec<String>>) -> Result<Envelope<Vec<String>>> {
        let width = envelope.payload().len();
        let column = match self.column {
            Some(c) if c < width => c,
            None if width > 0 => width - 1,
            _ => {
                return Err(PipeError::malformed(
                    format!("{:?}", envelope.payload()),
                    format!("no label column in a row of {width} tokens"),
                ));
            }
        };
        let mut label = None;
        let envelope = envelope.map(|mut tokens| {
            label = Some(tokens.remove(column));
            tokens
        });
        Ok(match label {
            Some(label) => envelope.with_label(Label::Text(label)),
            None => envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::FeatureVector;

    fn iris_map() -> LabelMap {
        LabelMap::parse("Iris-setosa=0; Iris-versicolor=1").unwrap()
    }

    #[test]
    fn test_parse_label_map() {
        let map = iris_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("Iris-versicolor").unwrap(), Label::Number(1.0));
        assert!(LabelMap::parse("").is_err());
        assert!(LabelMap::parse("novalue").is_err());
    }

    #[test]
    fn test_relabel_from_current_label() {
        let stage = Relabel::<FeatureVector>::new(iris_map());
        let env = Envelope::new(FeatureVector::Dense(vec![1.0]))
            .with_label("Iris-setosa")
            .with_identifier("3");
        let out = stage.operate(env).unwrap();
        assert_eq!(out.label(), Some(&Label::Number(0.0)));
        assert_eq!(out.identifier(), Some("3"));
    }

    #[test]
    fn test_relabel_unknown_without_default() {
        let stage = Relabel::<FeatureVector>::new(iris_map());
        let env = Envelope::new(FeatureVector::Dense(vec![])).with_label("Iris-virginica");
        match stage.operate(env).unwrap_err() {
            PipeError::UnknownLabel { key } => assert_eq!(key, "Iris-virginica"),
            other => panic!("Expected UnknownLabel, got {other:?}"),
        }
    }

    #[test]
    fn test_relabel_default_applies() {
        let stage = Relabel::<FeatureVector>::new(iris_map().with_default(2.0));
        let env = Envelope::new(FeatureVector::Dense(vec![])).with_label("Iris-virginica");
        assert_eq!(stage.operate(env).unwrap().label(), Some(&Label::Number(2.0)));
    }

    #[test]
    fn test_relabel_keyed_by_payload() {
        let map = LabelMap::new().insert("spam", 1.0).insert("ham", -1.0);
        let stage = Relabel::new(map).keyed_by(|line: &String| {
            line.split_whitespace().next().map(str::to_string)
        });
        let out = stage
            .operate(Envelope::new("ham hello there".to_string()))
            .unwrap();
        assert_eq!(out.label(), Some(&Label::Number(-1.0)));
        assert_eq!(out.payload(), "ham hello there");
    }

    #[test]
    fn test_lift_label_last_and_at() {
        let row = || Envelope::new(vec!["a".to_string(), "1".to_string(), "2".to_string()]);
        let out = LiftLabel::last().operate(row()).unwrap();
        assert_eq!(out.payload(), &["a", "1"]);
        assert_eq!(out.label(), Some(&Label::from("2")));

        let out = LiftLabel::at(0).operate(row()).unwrap();
        assert_eq!(out.payload(), &["1", "2"]);
        assert_eq!(out.label(), Some(&Label::from("a")));
    }

    #[test]
    fn test_lift_label_out_of_range() {
        let err = LiftLabel::at(4)
            .operate(Envelope::new(vec!["x".to_string()]))
            .unwrap_err();
        assert!(err.is_record_error());
        assert!(LiftLabel::last().operate(Envelope::new(vec![])).is_err());
    }
}
