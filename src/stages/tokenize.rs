//! SPLIT - delimiter tokenizer.

use crate::envelope::Envelope;
use crate::error::Result;
use crate::stage::Stage;

/// Splits a line on a single delimiter character.
///
/// Tokens are exactly the substrings between delimiters: no quoting, no
/// escaping, no trimming. `"a,,b"` yields `["a", "", "b"]`.
#[derive(Debug, Clone)]
pub struct SplitDelimited {
    delimiter: char,
}

impl SplitDelimited {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }
}

impl Stage for SplitDelimited {
    type In = String;
    type Out = Vec<String>;

    fn name(&self) -> &str {
        "SPLIT"
    }

    fn operate(&self, envelope: Envelope<String>) -> Result<Envelope<Vec<String>>> {
        Ok(envelope.map(|line| line.split(self.delimiter).map(str::to_string).collect()))
    }
}
