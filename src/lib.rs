//! # instance-pipes
//!
//! Lazy record pipelines that turn raw text data into labeled training
//! instances.
//!
//! ## Overview
//!
//! Data flows through a chain of small stages, one record at a time:
//! - **Envelopes**: every record is a payload plus identifier, label and weight
//! - **Sources**: lazy, single-pass producers (files, readers, in-memory rows)
//! - **Stages**: one-in, one-out payload transformations that leave metadata alone
//! - **Batch stages**: fold a bounded run of records into one aggregate
//! - **Pipelines**: a source plus stages, pulled as a single lazy sequence
//!
//! Nothing is read until the caller asks for the next record, so files much
//! larger than memory stream through in constant space.
//!
//! ## Example
//!
//! ```
//! use instance_pipes::{InstanceCollector, Pipeline, VecSource};
//! use instance_pipes::stages::{ParseSparseLine, ToInstance};
//!
//! let lines = vec![
//!     "-1 3:0.5 7 12:2.0".to_string(),
//!     "1 2 4:1.5".to_string(),
//!     "1 9".to_string(),
//! ];
//!
//! let batches: Vec<_> = Pipeline::new(VecSource::from_payloads(lines))
//!     .add_pipe(ParseSparseLine::new(16))
//!     .add_pipe(ToInstance::new())
//!     .batches(InstanceCollector, 2)
//!     .map(|b| b.unwrap().consumed)
//!     .collect();
//!
//! assert_eq!(batches, vec![2, 1]);
//! ```

pub mod batch;
pub mod dsl;
pub mod envelope;
pub mod error;
pub mod instance;
pub mod payload;
pub mod pipeline;
pub mod source;
pub mod stage;
pub mod stages;
pub mod trace;
pub mod vector;

pub use batch::{BatchOutput, BatchStage, Batches, Collect, InstanceCollector};
pub use dsl::{
    Command, OnError, RunStats, build_pipeline, command_to_stage, execute_pipeline,
    execute_pipeline_traced, execute_pipeline_with, parse_commands, render_envelope, run,
};
pub use envelope::{DEFAULT_WEIGHT, Envelope, Label};
pub use error::{PipeError, Result};
pub use instance::{Instance, InstanceCollection};
pub use payload::{Payload, PayloadKind, PayloadType};
pub use pipeline::{DynPipeline, DynPipelineBuilder, Pipeline};
pub use source::{Envelopes, IterSource, LineSource, Source, VecSource};
pub use stage::{DynStage, FnStage, Stage, map_stage};
pub use trace::RecordTrace;
pub use vector::{FeatureVector, Layout};
