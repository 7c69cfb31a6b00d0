//! LINES - expands a source of file paths into a source of lines.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::envelope::{Envelope, Label};
use crate::error::{PipeError, Result};
use crate::source::{LineSource, Source};

/// Open file currently being read, plus the metadata of its path envelope.
struct Current {
    path: String,
    lines: LineSource<BufReader<File>>,
    label: Option<Label>,
    weight: f64,
}

/// Yields one envelope per non-empty line of each file named upstream.
///
/// Files are opened one at a time, only when the previous one is exhausted.
/// Each line carries the label and weight of the path envelope it came from
/// and an identifier of the form `path:line`. A file that cannot be opened
/// is reported once, in place of its lines; pulling again moves on to the
/// next path.
pub struct FileLines<S> {
    paths: S,
    current: Option<Current>,
    pending: Option<PipeError>,
}

impl<S: Source<Payload = PathBuf>> FileLines<S> {
    pub fn new(paths: S) -> Self {
        Self {
            paths,
            current: None,
            pending: None,
        }
    }

    /// Advance to a file with a line ready, or park an open/read error.
    fn advance(&mut self) -> bool {
        loop {
            if self.pending.is_some() {
                return true;
            }
            if let Some(current) = self.current.as_mut() {
                if current.lines.has_next() {
                    return true;
                }
                self.current = None;
            }
            if !self.paths.has_next() {
                return false;
            }
            match self.paths.next_envelope() {
                Ok(envelope) => {
                    let label = envelope.label().cloned();
                    let weight = envelope.weight();
                    let path = envelope.into_payload();
                    match LineSource::open(&path) {
                        Ok(lines) => {
                            self.current = Some(Current {
                                path: path.display().to_string(),
                                lines: lines.numbered(),
                                label,
                                weight,
                            });
                        }
                        Err(e) => self.pending = Some(e),
                    }
                }
                Err(e) => self.pending = Some(e),
            }
        }
    }
}

impl<S: Source<Payload = PathBuf>> Source for FileLines<S> {
    type Payload = String;

    fn has_next(&mut self) -> bool {
        self.advance()
    }

    fn next_envelope(&mut self) -> Result<Envelope<String>> {
        if !self.advance() {
            return Err(PipeError::Exhausted);
        }
        if let Some(e) = self.pending.take() {
            return Err(e);
        }
        let current = self.current.as_mut().ok_or(PipeError::Exhausted)?;
        let line = current.lines.next_envelope()?;
        let line_no = line.identifier().unwrap_or_default().to_string();
        let mut envelope = line
            .with_identifier(format!("{}:{line_no}", current.path))
            .with_weight(current.weight);
        if let Some(label) = &current.label {
            envelope = envelope.with_label(label.clone());
        }
        Ok(envelope)
    }
}
