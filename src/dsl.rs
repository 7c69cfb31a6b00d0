//! DSL parser and driver for pipeline descriptions.
//!
//! Pipeline format (CMS Pipelines style):
//! ```text
//! PIPE LINES
//! | SPLIT ","
//! | COLUMNS 5 LABEL 4
//! | RELABEL "Iris-setosa=0;Iris-versicolor=1" DEFAULT 2
//! | INSTANCE
//! ?
//! ```
//!
//! - `PIPE LINES` starts the pipeline, reading the input one line at a time
//! - `| <stage>` continues to the next stage
//! - `?` on its own line marks the end of the pipeline
//! - Lines starting with `#` are comments
//!
//! Supported stages (payload kinds in brackets):
//! - `LINES` - Source: one record per non-empty input line, identified by line number [-> text]
//! - `SPLIT /d/` - Split on a single delimiter character; `SPLIT TAB` and `SPLIT SPACE` also work [text -> tokens]
//! - `LABEL [n]` - Move token `n` (default: last) onto the record label [tokens -> tokens]
//! - `COLUMNS n [LABEL k] [SPARSE]` - Parse `n` numeric columns, column `k` is the label [tokens -> vector]
//! - `SPARSE dim [HASH]` - Decode `label idx[:val] ...` into `dim` features [text -> vector]
//! - `RELABEL /k=v;.../ [DEFAULT v]` - Map labels through a table [any -> same]
//! - `WEIGHT w` - Set the record weight [any -> same]
//! - `INSTANCE` - Build a labeled instance [vector -> instance]
//!
//! Stage kinds are checked while the pipeline is assembled, so a
//! description such as `LINES | COLUMNS 3` is rejected before any input is
//! read.

use tracing::debug;

use crate::envelope::Envelope;
use crate::error::{PipeError, Result};
use crate::instance::Instance;
use crate::payload::{Payload, PayloadKind};
use crate::pipeline::DynPipeline;
use crate::source::{LineSource, Source};
use crate::stage::DynStage;
use crate::stages::{
    IndexFold, LabelMap, LiftLabel, ParseColumns, ParseSparseLine, Relabel, SetWeight,
    SplitDelimited, ToInstance, parse_label_value,
};
use crate::trace::RecordTrace;
use crate::vector::{FeatureVector, Layout};

/// A parsed pipeline command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// LINES - read input lines
    Lines,
    /// SPLIT /d/
    Split { delimiter: char },
    /// LABEL [n]
    Label { column: Option<usize> },
    /// COLUMNS n [LABEL k] [SPARSE]
    Columns {
        width: usize,
        label: Option<usize>,
        layout: Layout,
    },
    /// SPARSE dim [HASH]
    Sparse { dimension: usize, hashed: bool },
    /// RELABEL /k=v;.../ [DEFAULT v]
    Relabel { map: LabelMap },
    /// WEIGHT w
    Weight { weight: f64 },
    /// INSTANCE
    Instance,
}

impl Command {
    /// Can this stage be the first stage in a pipeline (source)?
    pub fn can_be_first(&self) -> bool {
        matches!(self, Command::Lines)
    }

    /// Get the stage name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Lines => "LINES",
            Command::Split { .. } => "SPLIT",
            Command::Label { .. } => "LABEL",
            Command::Columns { .. } => "COLUMNS",
            Command::Sparse { .. } => "SPARSE",
            Command::Relabel { .. } => "RELABEL",
            Command::Weight { .. } => "WEIGHT",
            Command::Instance => "INSTANCE",
        }
    }
}

/// What the driver does with a record that fails a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Stop and return the error.
    #[default]
    Abort,
    /// Remember the error and keep pulling.
    Skip,
}

/// Counts from driving a pipeline to the end.
#[derive(Debug, Default)]
pub struct RunStats {
    pub input_count: usize,
    pub output_count: usize,
    /// Record errors passed over under [`OnError::Skip`].
    pub skipped: Vec<PipeError>,
}

/// Parse DSL text into commands.
pub fn parse_commands(text: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Handle "PIPE COMMAND" - extract command after PIPE
        let line = if line.to_uppercase().starts_with("PIPE ") {
            line[5..].trim()
        } else if line.eq_ignore_ascii_case("PIPE") {
            continue;
        } else {
            line
        };

        // Handle continuation lines: "| COMMAND ..."
        let line = match line.strip_prefix('|') {
            Some(stripped) => stripped.trim(),
            None => line,
        };

        // Remove trailing ? (explicit end of pipeline)
        let line = line.trim_end_matches('?').trim();

        if line.is_empty() {
            continue;
        }

        let cmd = parse_command(line).map_err(|message| PipeError::Parse {
            line: line_num + 1,
            message,
        })?;
        commands.push(cmd);
    }

    Ok(commands)
}

/// Parse a single command line.
fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    match keyword.to_uppercase().as_str() {
        "LINES" => Ok(Command::Lines),
        "SPLIT" => parse_split(rest),
        "LABEL" => parse_label(rest),
        "COLUMNS" => parse_columns(rest),
        "SPARSE" => parse_sparse(rest),
        "RELABEL" => parse_relabel(rest),
        "WEIGHT" => parse_weight(rest),
        "INSTANCE" => Ok(Command::Instance),
        _ => Err(format!("Unknown command: {keyword}")),
    }
}

/// Parse a delimited string using CMS Pipelines convention.
/// The first non-blank character is the delimiter, and the string
/// continues until the next occurrence of that delimiter.
/// Returns (extracted_string, rest_of_input).
fn parse_delimited_string(s: &str) -> std::result::Result<(String, &str), String> {
    let s = s.trim_start();
    let delim = s
        .chars()
        .next()
        .ok_or_else(|| "Expected delimited string".to_string())?;
    let after_delim = &s[delim.len_utf8()..];

    match after_delim.find(delim) {
        Some(end) => Ok((
            after_delim[..end].to_string(),
            &after_delim[end + delim.len_utf8()..],
        )),
        None => Err(format!("Unclosed delimiter '{delim}'")),
    }
}

/// Parse SPLIT command.
/// Formats: SPLIT "," | SPLIT /;/ | SPLIT TAB | SPLIT SPACE
fn parse_split(rest: &str) -> std::result::Result<Command, String> {
    let delimiter = match rest.to_uppercase().as_str() {
        "" => return Err("SPLIT requires a delimiter".to_string()),
        "TAB" => '\t',
        "SPACE" => ' ',
        _ => {
            let (text, _) = parse_delimited_string(rest)?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(format!("SPLIT delimiter must be one character, got '{text}'")),
            }
        }
    };
    Ok(Command::Split { delimiter })
}

/// Parse LABEL command.
fn parse_label(rest: &str) -> std::result::Result<Command, String> {
    if rest.is_empty() {
        return Ok(Command::Label { column: None });
    }
    let column: usize = rest.parse().map_err(|_| "LABEL requires a column number")?;
    Ok(Command::Label {
        column: Some(column),
    })
}

/// Parse COLUMNS command.
/// Format: COLUMNS n [LABEL k] [SPARSE]
fn parse_columns(rest: &str) -> std::result::Result<Command, String> {
    let mut words = rest.split_whitespace();
    let width: usize = words
        .next()
        .and_then(|w| w.parse().ok())
        .ok_or("COLUMNS requires a column count")?;
    if width == 0 {
        return Err("COLUMNS count must be at least 1".to_string());
    }

    let mut label = None;
    let mut layout = Layout::Dense;
    while let Some(word) = words.next() {
        match word.to_uppercase().as_str() {
            "LABEL" => {
                let k: usize = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or("COLUMNS LABEL requires a column number")?;
                if k >= width {
                    return Err(format!("label column {k} is outside {width} columns"));
                }
                label = Some(k);
            }
            "SPARSE" => layout = Layout::Sparse,
            "DENSE" => layout = Layout::Dense,
            other => return Err(format!("Unexpected COLUMNS option: {other}")),
        }
    }
    Ok(Command::Columns {
        width,
        label,
        layout,
    })
}

/// Parse SPARSE command.
/// Format: SPARSE dim [HASH]
fn parse_sparse(rest: &str) -> std::result::Result<Command, String> {
    let mut words = rest.split_whitespace();
    let dimension: usize = words
        .next()
        .and_then(|w| w.parse().ok())
        .ok_or("SPARSE requires a dimension")?;
    if dimension == 0 {
        return Err("SPARSE dimension must be at least 1".to_string());
    }
    let hashed = match words.next() {
        None => false,
        Some(w) if w.eq_ignore_ascii_case("HASH") => true,
        Some(w) => return Err(format!("Unexpected SPARSE option: {w}")),
    };
    Ok(Command::Sparse { dimension, hashed })
}

/// Parse RELABEL command.
/// Format: RELABEL /key=value;key=value/ [DEFAULT value]
fn parse_relabel(rest: &str) -> std::result::Result<Command, String> {
    if rest.is_empty() {
        return Err("RELABEL requires a delimited label map".to_string());
    }
    let (table, after) = parse_delimited_string(rest)?;
    let mut map = LabelMap::parse(&table)?;

    let after = after.trim();
    if !after.is_empty() {
        let (keyword, value) = after.split_once(char::is_whitespace).unwrap_or((after, ""));
        if !keyword.eq_ignore_ascii_case("DEFAULT") || value.trim().is_empty() {
            return Err(format!("Unexpected RELABEL option: {after}"));
        }
        map = map.with_default(parse_label_value(value.trim()));
    }
    Ok(Command::Relabel { map })
}

/// Parse WEIGHT command.
fn parse_weight(rest: &str) -> std::result::Result<Command, String> {
    let weight: f64 = rest.parse().map_err(|_| "WEIGHT requires a number")?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(format!("WEIGHT must be a non-negative number, got {rest}"));
    }
    Ok(Command::Weight { weight })
}

/// Boxes a stage that keeps its payload type, instantiated for `kind`.
/// `$ty` names the payload type inside `$make`.
macro_rules! for_kind {
    ($kind:expr, $ty:ident => $make:expr) => {
        match $kind {
            PayloadKind::Text => {
                type $ty = String;
                Box::new($make) as Box<dyn DynStage>
            }
            PayloadKind::Tokens => {
                type $ty = Vec<String>;
                Box::new($make) as Box<dyn DynStage>
            }
            PayloadKind::Vector => {
                type $ty = FeatureVector;
                Box::new($make) as Box<dyn DynStage>
            }
            PayloadKind::Instance => {
                type $ty = Instance;
                Box::new($make) as Box<dyn DynStage>
            }
        }
    };
}

/// Create a stage from a parsed `Command`.
///
/// `upstream` is the payload kind the stage will receive; stages that keep
/// their payload type are instantiated for it. Sources have no stage form.
pub fn command_to_stage(cmd: &Command, upstream: PayloadKind) -> Result<Box<dyn DynStage>> {
    let stage: Box<dyn DynStage> = match cmd {
        Command::Lines => {
            return Err(PipeError::InvalidPipeline(
                "LINES can only be the first stage".to_string(),
            ));
        }
        Command::Split { delimiter } => Box::new(SplitDelimited::new(*delimiter)),
        Command::Label { column } => Box::new(match column {
            Some(c) => LiftLabel::at(*c),
            None => LiftLabel::last(),
        }),
        Command::Columns {
            width,
            label,
            layout,
        } => {
            let mut stage = ParseColumns::new(*width).layout(*layout);
            if let Some(k) = label {
                stage = stage.label_column(*k);
            }
            Box::new(stage)
        }
        Command::Sparse { dimension, hashed } => {
            let fold = if *hashed {
                IndexFold::hashed()
            } else {
                IndexFold::modulo()
            };
            Box::new(ParseSparseLine::new(*dimension).fold(fold))
        }
        Command::Relabel { map } => for_kind!(upstream, T => Relabel::<T>::new(map.clone())),
        Command::Weight { weight } => for_kind!(upstream, T => SetWeight::<T>::new(*weight)),
        Command::Instance => Box::new(ToInstance::new()),
    };
    Ok(stage)
}

/// Assemble a pipeline from commands, reading records from `source`.
///
/// The first command must be a source command. Each later stage is checked
/// against the kind produced by its predecessor.
pub fn build_pipeline<S>(commands: &[Command], source: S) -> Result<DynPipeline>
where
    S: Source<Payload = String> + Send + 'static,
{
    let first = commands
        .first()
        .ok_or_else(|| PipeError::InvalidPipeline("Pipeline is empty".to_string()))?;
    if !first.can_be_first() {
        return Err(PipeError::InvalidPipeline(format!(
            "{} cannot be the first stage (try LINES)",
            first.name()
        )));
    }

    let mut builder = DynPipeline::builder(source);
    for cmd in &commands[1..] {
        let stage = command_to_stage(cmd, builder.output_kind())?;
        builder = builder.add_pipe(stage)?;
    }
    Ok(builder.build())
}

/// Pull every record from `pipeline`, handing each result to `emit`.
///
/// Record errors (malformed rows, unknown labels) stop the run under
/// [`OnError::Abort`] and are collected under [`OnError::Skip`]. Any other
/// error always stops the run.
pub fn run(
    pipeline: &mut DynPipeline,
    on_error: OnError,
    mut emit: impl FnMut(Envelope<Payload>),
) -> Result<RunStats> {
    let mut stats = RunStats::default();
    while pipeline.has_next() {
        stats.input_count += 1;
        match pipeline.next_envelope() {
            Ok(envelope) => {
                stats.output_count += 1;
                emit(envelope);
            }
            Err(e) if on_error == OnError::Skip && e.is_record_error() => stats.skipped.push(e),
            Err(e) => return Err(e),
        }
    }
    debug!(
        input = stats.input_count,
        output = stats.output_count,
        skipped = stats.skipped.len(),
        "pipeline drained"
    );
    Ok(stats)
}

/// One output line for an envelope: instances render as sparse text, other
/// labeled payloads are prefixed with their label.
pub fn render_envelope(envelope: &Envelope<Payload>) -> String {
    match (envelope.payload(), envelope.label()) {
        (Payload::Instance(_), _) | (_, None) => envelope.payload().render(),
        (payload, Some(label)) => format!("{label} {}", payload.render()),
    }
}

fn build_from_text(input_text: &str, pipeline_text: &str) -> Result<DynPipeline> {
    let commands = parse_commands(pipeline_text)?;
    build_pipeline(&commands, LineSource::from_text(input_text).numbered())
}

/// Execute a pipeline defined by DSL text on input text.
///
/// Returns (output_text, input_count, output_count) on success. The first
/// failing record aborts the run.
pub fn execute_pipeline(input_text: &str, pipeline_text: &str) -> Result<(String, usize, usize)> {
    let (output, stats) = execute_pipeline_with(input_text, pipeline_text, OnError::Abort)?;
    Ok((output, stats.input_count, stats.output_count))
}

/// Execute a pipeline with an explicit policy for failing records.
pub fn execute_pipeline_with(
    input_text: &str,
    pipeline_text: &str,
    on_error: OnError,
) -> Result<(String, RunStats)> {
    let mut pipeline = build_from_text(input_text, pipeline_text)?;
    let mut lines = Vec::new();
    let stats = run(&mut pipeline, on_error, |envelope| {
        lines.push(render_envelope(&envelope))
    })?;
    Ok((lines.join("\n"), stats))
}

/// Execute a pipeline capturing a trace of every record.
///
/// Failing records are traced up to the failing stage and do not stop the
/// run. Returns the stage names alongside the traces.
pub fn execute_pipeline_traced(
    input_text: &str,
    pipeline_text: &str,
) -> Result<(Vec<String>, Vec<RecordTrace>)> {
    let mut pipeline = build_from_text(input_text, pipeline_text)?;
    let names = pipeline
        .stage_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut traces = Vec::new();
    while pipeline.has_next() {
        match pipeline.next_traced() {
            Ok(trace) => traces.push(trace),
            Err((trace, e)) if e.is_record_error() => traces.push(trace),
            Err((_, e)) => return Err(e),
        }
    }
    Ok((names, traces))
}
