//! COLUMNS - numeric column parser.

use crate::envelope::{Envelope, Label};
use crate::error::{PipeError, Result};
use crate::stage::Stage;
use crate::vector::{FeatureVector, Layout};

/// Parses a fixed-width row of tokens into a feature vector.
///
/// Every non-label token must parse as an `f64` (surrounding whitespace is
/// ignored). Feature indices are column positions with the label column
/// removed, so with a label in column 3 of 4 the features land at 0, 1, 2.
/// When a label column is configured its token becomes the envelope label;
/// otherwise the incoming label is left as it was.
#[derive(Debug, Clone)]
pub struct ParseColumns {
    width: usize,
    label_column: Option<usize>,
    layout: Layout,
}

impl ParseColumns {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            label_column: None,
            layout: Layout::Dense,
        }
    }

    /// Lift column `index` onto the envelope label. An index outside the
    /// width is a configuration error reported by every `operate` call.
    pub fn label_column(mut self, index: usize) -> Self {
        self.label_column = Some(index);
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Number of features each row produces.
    pub fn dimension(&self) -> usize {
        self.width - usize::from(self.label_column.is_some_and(|k| k < self.width))
    }

    fn parse_row(&self, tokens: &[String]) -> Result<(FeatureVector, Option<Label>)> {
        if let Some(k) = self.label_column
            && k >= self.width
        {
            return Err(PipeError::InvalidPipeline(format!(
                "COLUMNS label column {k} is outside {} columns",
                self.width
            )));
        }
        if tokens.len() != self.width {
            return Err(PipeError::malformed(
                format!("{tokens:?}"),
                format!("expected {} columns, found {}", self.width, tokens.len()),
            ));
        }

        let mut features = FeatureVector::zeros(self.dimension(), self.layout);
        let mut label = None;
        let mut index = 0;
        for (column, token) in tokens.iter().enumerate() {
            if Some(column) == self.label_column {
                label = Some(Label::Text(token.trim().to_string()));
                continue;
            }
            let value: f64 = token.trim().parse().map_err(|_| {
                PipeError::malformed(
                    format!("{tokens:?}"),
                    format!("column {column} is not numeric: {token:?}"),
                )
            })?;
            features.set(index, value);
            index += 1;
        }
        Ok((features, label))
    }
}

impl Stage for ParseColumns {
    type In = Vec<String>;
    type Out = FeatureVector;

    fn name(&self) -> &str {
        "COLUMNS"
    }

    fn operate(&self, envelope: Envelope<Vec<String>>) -> Result<Envelope<FeatureVector>> {
        let (features, label) = self.parse_row(envelope.payload())?;
        let envelope = envelope.with_payload(features);
        Ok(match label {
            Some(label) => envelope.with_label(label),
            None => envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Envelope<Vec<String>> {
        Envelope::new(line.split(',').map(str::to_string).collect())
    }

    #[test]
    fn test_label_lifted_from_last_column() {
        let out = ParseColumns::new(4)
            .label_column(3)
            .operate(tokens("1,2,3,Iris-setosa"))
            .unwrap();
        assert_eq!(out.payload(), &FeatureVector::Dense(vec![1.0, 2.0, 3.0]));
        assert_eq!(out.label(), Some(&Label::from("Iris-setosa")));
    }

    #[test]
    fn test_label_in_first_column_shifts_indices() {
        let out = ParseColumns::new(3)
            .label_column(0)
            .layout(Layout::Sparse)
            .operate(tokens("yes,0,4.5"))
            .unwrap();
        assert_eq!(out.payload().dimension(), 2);
        assert_eq!(out.payload().iter().collect::<Vec<_>>(), vec![(1, 4.5)]);
    }

    #[test]
    fn test_non_numeric_token_is_malformed() {
        let err = ParseColumns::new(4)
            .label_column(3)
            .operate(tokens("1,2,x,label"))
            .unwrap_err();
        match err {
            PipeError::MalformedRecord { raw, cause } => {
                assert!(raw.contains("\"x\""));
                assert!(cause.contains("column 2"));
            }
            other => panic!("Expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_width_mismatch_is_malformed() {
        let err = ParseColumns::new(4).operate(tokens("1,2,3")).unwrap_err();
        assert!(err.to_string().contains("expected 4 columns, found 3"));
    }

    #[test]
    fn test_without_label_column_keeps_existing_label() {
        let out = ParseColumns::new(2)
            .operate(tokens(" 1 ,2").with_label(-1.0).with_weight(2.0))
            .unwrap();
        assert_eq!(out.payload().to_dense(), vec![1.0, 2.0]);
        assert_eq!(out.label(), Some(&Label::Number(-1.0)));
        assert_eq!(out.weight(), 2.0);
    }

    #[test]
    fn test_out_of_range_label_column_is_rejected() {
        let stage = ParseColumns::new(2).label_column(5);
        let err = stage.operate(tokens("1,2")).unwrap_err();
        assert!(matches!(err, PipeError::InvalidPipeline(_)));
        assert!(!err.is_record_error());
        assert!(err.to_string().contains("label column 5"));
    }
}
