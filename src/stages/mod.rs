//! Concrete stages for delimited and sparse text data.
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | [`SplitDelimited`] | text | tokens |
//! | [`LiftLabel`] | tokens | tokens |
//! | [`ParseColumns`] | tokens | vector |
//! | [`ParseSparseLine`] | text | vector |
//! | [`Relabel`] | any | same |
//! | [`SetWeight`] | any | same |
//! | [`ToInstance`] | vector | instance |
//!
//! [`FileLines`] is a source adapter rather than a stage: it turns a source
//! of paths into a source of lines.

pub mod columns;
pub mod instance;
pub mod label;
pub mod lines;
pub mod sparse;
pub mod tokenize;

pub use columns::ParseColumns;
pub use instance::{SetWeight, ToInstance};
pub use label::{LabelMap, LiftLabel, Relabel, parse_label_value};
pub use lines::FileLines;
pub use sparse::{IndexFold, ParseSparseLine};
pub use tokenize::SplitDelimited;
