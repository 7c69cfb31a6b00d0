//! Debug trace of one record's journey through a pipeline.

use crate::envelope::Envelope;
use crate::payload::Payload;

/// Payload snapshots at each pipe point of a single pull.
///
/// `pipe_points[0]` is the source output, `pipe_points[i]` is the output
/// after stage `i - 1`. A complete trace has `num_stages + 1` points; a
/// trace cut short by a failing stage names that stage in `failed_stage`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTrace {
    pub pipe_points: Vec<Envelope<Payload>>,
    pub failed_stage: Option<String>,
}

impl RecordTrace {
    /// Did the record make it through every stage?
    pub fn completed(&self) -> bool {
        self.failed_stage.is_none()
    }

    /// Multi-line rendering: one line per pipe point, labelled with the
    /// stage that produced it.
    pub fn render(&self, stage_names: &[&str]) -> String {
        let mut lines = Vec::with_capacity(self.pipe_points.len() + 1);
        for (i, point) in self.pipe_points.iter().enumerate() {
            let producer = if i == 0 {
                "SOURCE"
            } else {
                stage_names.get(i - 1).copied().unwrap_or("?")
            };
            let label = point
                .label()
                .map(|l| format!(" label={l}"))
                .unwrap_or_default();
            lines.push(format!("  {producer:<10}{label} {}", point.payload().render()));
        }
        if let Some(stage) = &self.failed_stage {
            lines.push(format!("  {stage:<10} FAILED"));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_trace_is_complete_and_empty() {
        let trace = RecordTrace::default();
        assert!(trace.completed());
        assert!(trace.pipe_points.is_empty());
    }

    #[test]
    fn test_render_names_producers() {
        let trace = RecordTrace {
            pipe_points: vec![
                Envelope::new(Payload::Text("a,b".into())),
                Envelope::new(Payload::Tokens(vec!["a".into(), "b".into()])).with_label("y"),
            ],
            failed_stage: Some("COLUMNS".into()),
        };
        let text = trace.render(&["SPLIT", "COLUMNS"]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("SOURCE") && lines[0].ends_with("a,b"));
        assert!(lines[1].contains("SPLIT") && lines[1].contains("label=y"));
        assert!(lines[2].contains("FAILED"));
        assert!(!trace.completed());
    }
}
