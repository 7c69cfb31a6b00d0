//! Payload kinds for pipelines assembled at run time.
//!
//! Typed pipelines are checked by the compiler. Pipelines built from a
//! description carry a [`Payload`] and check each stage's declared
//! [`PayloadKind`] against its upstream when the stage is appended.

use std::fmt;

use crate::error::{PipeError, Result};
use crate::instance::Instance;
use crate::vector::FeatureVector;

/// Tag naming the shape of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Text,
    Tokens,
    Vector,
    Instance,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Text => "text",
            PayloadKind::Tokens => "tokens",
            PayloadKind::Vector => "vector",
            PayloadKind::Instance => "instance",
        };
        f.write_str(name)
    }
}

/// A payload whose concrete type is known only at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Tokens(Vec<String>),
    Vector(FeatureVector),
    Instance(Instance),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Text(_) => PayloadKind::Text,
            Payload::Tokens(_) => PayloadKind::Tokens,
            Payload::Vector(_) => PayloadKind::Vector,
            Payload::Instance(_) => PayloadKind::Instance,
        }
    }

    /// One-line rendering used for pipeline output.
    pub fn render(&self) -> String {
        match self {
            Payload::Text(t) => t.clone(),
            Payload::Tokens(tokens) => tokens.join("|"),
            Payload::Vector(v) => v
                .iter()
                .map(|(i, x)| format!("{i}:{x}"))
                .collect::<Vec<_>>()
                .join(" "),
            Payload::Instance(inst) => inst.to_sparse_line(),
        }
    }
}

/// Concrete payload types that have a run-time kind.
pub trait PayloadType: Sized {
    const KIND: PayloadKind;

    fn into_payload(self) -> Payload;

    /// Unwrap a dynamic payload; fails if the kinds disagree.
    fn from_payload(payload: Payload) -> Result<Self>;
}

macro_rules! payload_type {
    ($ty:ty, $variant:ident) => {
        impl PayloadType for $ty {
            const KIND: PayloadKind = PayloadKind::$variant;

            fn into_payload(self) -> Payload {
                Payload::$variant(self)
            }

            fn from_payload(payload: Payload) -> Result<Self> {
                match payload {
                    Payload::$variant(inner) => Ok(inner),
                    other => Err(PipeError::TypeMismatch {
                        stage: stringify!($ty).to_string(),
                        expected: PayloadKind::$variant,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

payload_type!(String, Text);
payload_type!(Vec<String>, Tokens);
payload_type!(FeatureVector, Vector);
payload_type!(Instance, Instance);
