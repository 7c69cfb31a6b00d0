//! Sources: the lazy producers at the head of every pipeline.
//!
//! A source is pulled with [`Source::has_next`] / [`Source::next_envelope`].
//! Sources are single-pass; traversing the data again means constructing a
//! new source. File-backed sources own their handle and drop it as soon as
//! the data runs out or a read fails.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::iter::Peekable;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::envelope::Envelope;
use crate::error::{PipeError, Result};

/// A forward-only producer of envelopes.
pub trait Source {
    type Payload;

    /// Is another envelope available? Reads ahead at most one record.
    fn has_next(&mut self) -> bool;

    /// Take the next envelope, or `PipeError::Exhausted` when none is left.
    fn next_envelope(&mut self) -> Result<Envelope<Self::Payload>>;

    /// View this source as an iterator of envelope results.
    fn envelopes(self) -> Envelopes<Self>
    where
        Self: Sized,
    {
        Envelopes { source: self }
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    type Payload = S::Payload;

    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_envelope(&mut self) -> Result<Envelope<S::Payload>> {
        (**self).next_envelope()
    }
}

impl<S: Source + ?Sized> Source for &mut S {
    type Payload = S::Payload;

    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_envelope(&mut self) -> Result<Envelope<S::Payload>> {
        (**self).next_envelope()
    }
}

/// Iterator adapter returned by [`Source::envelopes`].
pub struct Envelopes<S> {
    source: S,
}

impl<S: Source> Iterator for Envelopes<S> {
    type Item = Result<Envelope<S::Payload>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.source.has_next() {
            Some(self.source.next_envelope())
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory sources
// ---------------------------------------------------------------------------

/// Source over an in-memory list of envelopes.
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    items: VecDeque<Envelope<T>>,
}

impl<T> VecSource<T> {
    /// Wrap bare payloads, each in a metadata-free envelope.
    pub fn from_payloads(payloads: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: payloads.into_iter().map(Envelope::new).collect(),
        }
    }

    pub fn from_envelopes(envelopes: impl IntoIterator<Item = Envelope<T>>) -> Self {
        Self {
            items: envelopes.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T> Source for VecSource<T> {
    type Payload = T;

    fn has_next(&mut self) -> bool {
        !self.items.is_empty()
    }

    fn next_envelope(&mut self) -> Result<Envelope<T>> {
        self.items.pop_front().ok_or(PipeError::Exhausted)
    }
}

/// Source over any iterator of payloads, possibly unbounded.
pub struct IterSource<I: Iterator> {
    inner: Peekable<I>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: iter.into_iter().peekable(),
        }
    }
}

impl<I: Iterator> Source for IterSource<I> {
    type Payload = I::Item;

    fn has_next(&mut self) -> bool {
        self.inner.peek().is_some()
    }

    fn next_envelope(&mut self) -> Result<Envelope<I::Item>> {
        self.inner.next().map(Envelope::new).ok_or(PipeError::Exhausted)
    }
}

// ---------------------------------------------------------------------------
// Line source
// ---------------------------------------------------------------------------

/// Source yielding one `String` envelope per non-empty line of a reader.
///
/// Line terminators (`\n` or `\r\n`) are stripped and empty lines produce no
/// envelope. The reader is dropped once it reports end of input or an error.
pub struct LineSource<R> {
    reader: Option<R>,
    origin: PathBuf,
    peeked: Option<Result<(usize, String)>>,
    line_no: usize,
    numbered: bool,
}

impl LineSource<BufReader<File>> {
    /// Open a file. Fails immediately with `PipeError::Resource` when the
    /// file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| PipeError::resource(path, e))?;
        debug!(path = %path.display(), "opened line source");
        Ok(Self::with_origin(BufReader::new(file), path.to_path_buf()))
    }
}

impl LineSource<Cursor<String>> {
    /// Lines of an in-memory text blob.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::with_origin(Cursor::new(text.into()), PathBuf::from("<text>"))
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self::with_origin(reader, PathBuf::from("<reader>"))
    }

    fn with_origin(reader: R, origin: PathBuf) -> Self {
        Self {
            reader: Some(reader),
            origin,
            peeked: None,
            line_no: 0,
            numbered: false,
        }
    }

    /// Set each envelope's identifier to its 1-based line number.
    pub fn numbered(mut self) -> Self {
        self.numbered = true;
        self
    }

    /// Has the underlying handle been released?
    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(origin = %self.origin.display(), lines = self.line_no, "released line source");
        }
    }

    fn fill(&mut self) {
        if self.peeked.is_some() {
            return;
        }
        let mut buf = String::new();
        while let Some(reader) = self.reader.as_mut() {
            buf.clear();
            match reader.read_line(&mut buf) {
                Ok(0) => self.release(),
                Ok(_) => {
                    self.line_no += 1;
                    let line = buf.trim_end_matches(['\n', '\r']);
                    if !line.is_empty() {
                        self.peeked = Some(Ok((self.line_no, line.to_string())));
                        return;
                    }
                }
                Err(e) => {
                    self.release();
                    self.peeked = Some(Err(PipeError::resource(self.origin.clone(), e)));
                    return;
                }
            }
        }
    }
}

impl<R: BufRead> Source for LineSource<R> {
    type Payload = String;

    fn has_next(&mut self) -> bool {
        self.fill();
        self.peeked.is_some()
    }

    fn next_envelope(&mut self) -> Result<Envelope<String>> {
        self.fill();
        let (line_no, line) = self.peeked.take().ok_or(PipeError::Exhausted)??;
        let envelope = Envelope::new(line);
        Ok(if self.numbered {
            envelope.with_identifier(line_no.to_string())
        } else {
            envelope
        })
    }
}
