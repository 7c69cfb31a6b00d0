//! SPARSE - decoder for the `label index[:value] ...` text format.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use crate::envelope::{Envelope, Label};
use crate::error::{PipeError, Result};
use crate::stage::Stage;
use crate::vector::{FeatureVector, Layout};

type FoldFn = dyn Fn(u64, usize) -> usize + Send + Sync;

/// Maps a raw feature index into `0..dimension`.
///
/// The result of every fold is reduced modulo the dimension once more, so
/// even a custom function cannot produce an out-of-range index.
#[derive(Clone)]
pub struct IndexFold {
    name: &'static str,
    f: Arc<FoldFn>,
}

impl IndexFold {
    /// `index % dimension`: in-range indices are left alone.
    pub fn modulo() -> Self {
        Self {
            name: "modulo",
            f: Arc::new(|index, dimension| (index % dimension as u64) as usize),
        }
    }

    /// Feature hashing: every index is hashed, then reduced.
    ///
    /// Uses the standard library's SipHash with fixed keys, so the mapping
    /// is stable within a build.
    pub fn hashed() -> Self {
        Self {
            name: "hashed",
            f: Arc::new(|index, dimension| {
                let mut hasher = DefaultHasher::new();
                index.hash(&mut hasher);
                (hasher.finish() % dimension as u64) as usize
            }),
        }
    }

    pub fn custom(name: &'static str, f: impl Fn(u64, usize) -> usize + Send + Sync + 'static) -> Self {
        Self { name, f: Arc::new(f) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fold `index` into `0..dimension`. A dimension of zero is treated as one.
    pub fn apply(&self, index: u64, dimension: usize) -> usize {
        let dimension = dimension.max(1);
        (self.f)(index, dimension) % dimension
    }
}

impl Default for IndexFold {
    fn default() -> Self {
        Self::modulo()
    }
}

impl fmt::Debug for IndexFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexFold").field(&self.name).finish()
    }
}

/// Decodes `<label> <index>[:<value>] ...` lines into sparse vectors.
///
/// The label token must be numeric and becomes the envelope label. A feature
/// without a value counts as 1.0. Indices that fold onto the same slot are
/// summed. A dimension of zero is treated as one.
#[derive(Debug, Clone)]
pub struct ParseSparseLine {
    dimension: usize,
    fold: IndexFold,
}

impl ParseSparseLine {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            fold: IndexFold::default(),
        }
    }

    pub fn fold(mut self, fold: IndexFold) -> Self {
        self.fold = fold;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn parse_line(&self, line: &str) -> Result<(f64, FeatureVector)> {
        let mut tokens = line.split_whitespace();
        let label_token = tokens
            .next()
            .ok_or_else(|| PipeError::malformed(line, "missing label"))?;
        let label: f64 = label_token.parse().map_err(|_| {
            PipeError::malformed(line, format!("label is not numeric: {label_token:?}"))
        })?;

        let mut features = FeatureVector::zeros(self.dimension, Layout::Sparse);
        for token in tokens {
            let (index_part, value_part) = match token.split_once(':') {
                Some((index, value)) => (index, Some(value)),
                None => (token, None),
            };
            let index: u64 = index_part.parse().map_err(|_| {
                PipeError::malformed(line, format!("bad feature index in {token:?}"))
            })?;
            let value: f64 = match value_part {
                Some(v) => v.parse().map_err(|_| {
                    PipeError::malformed(line, format!("bad feature value in {token:?}"))
                })?,
                None => 1.0,
            };
            let slot = self.fold.apply(index, self.dimension);
            features.set(slot, features.get(slot) + value);
        }
        Ok((label, features))
    }
}

impl Stage for ParseSparseLine {
    type In = String;
    type Out = FeatureVector;

    fn name(&self) -> &str {
        "SPARSE"
    }

    fn operate(&self, envelope: Envelope<String>) -> Result<Envelope<FeatureVector>> {
        let (label, features) = self.parse_line(envelope.payload())?;
        Ok(envelope.with_payload(features).with_label(Label::Number(label)))
    }
}
