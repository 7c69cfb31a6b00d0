//! The record envelope carried between pipeline stages.
//!
//! An [`Envelope`] wraps a payload together with the metadata every stage
//! must carry forward untouched unless it is explicitly responsible for it:
//! an identifier, a label, and an importance weight.

use std::fmt;

/// Default importance weight of a freshly created envelope.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A record label: either free text (`"Iris-setosa"`) or a number (`-1`).
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Text(String),
    Number(f64),
}

impl Label {
    /// Numeric value of the label, parsing text labels when they hold a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Label::Number(n) => Some(*n),
            Label::Text(t) => t.trim().parse().ok(),
        }
    }

    /// Key used for label lookups.
    pub fn key(&self) -> String {
        match self {
            Label::Text(t) => t.clone(),
            Label::Number(n) => n.to_string(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Text(t) => f.write_str(t),
            Label::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Text(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label::Text(s)
    }
}

impl From<f64> for Label {
    fn from(n: f64) -> Self {
        Label::Number(n)
    }
}

/// A payload plus its identifier, label and weight.
///
/// Envelopes are values: a stage consumes one and returns a new one rather
/// than mutating a shared record.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    payload: T,
    identifier: Option<String>,
    label: Option<Label>,
    weight: f64,
}

impl<T> Envelope<T> {
    /// Create an envelope with no identifier, no label and the default weight.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            identifier: None,
            label: None,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Replace the payload, keeping identifier, label and weight.
    pub fn with_payload<U>(self, payload: U) -> Envelope<U> {
        Envelope {
            payload,
            identifier: self.identifier,
            label: self.label,
            weight: self.weight,
        }
    }

    /// Transform the payload, keeping identifier, label and weight.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        let Envelope {
            payload,
            identifier,
            label,
            weight,
        } = self;
        Envelope {
            payload: f(payload),
            identifier,
            label,
            weight,
        }
    }

    /// Fallible variant of [`Envelope::map`].
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Envelope<U>, E> {
        let Envelope {
            payload,
            identifier,
            label,
            weight,
        } = self;
        Ok(Envelope {
            payload: f(payload)?,
            identifier,
            label,
            weight,
        })
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<Label>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}
