//! Fold runs driven by a pipeline description file.

use std::path::Path;

use instance_pipes::{
    DynPipeline, Envelope, Instance, LineSource, PayloadKind, PayloadType, PipeError, Result,
    Source, build_pipeline, parse_commands,
};

use crate::chunks::ChunkedTrainer;
use crate::error::FoldError;
use crate::folds::{FoldOutcome, FoldPlan, run_folds};
use crate::learner::LabelTally;

/// Typed view of a description-driven pipeline that ends in instances.
pub struct InstanceStream(DynPipeline);

impl InstanceStream {
    pub fn new(pipeline: DynPipeline) -> std::result::Result<Self, FoldError> {
        match pipeline.output_kind() {
            PayloadKind::Instance => Ok(Self(pipeline)),
            other => Err(FoldError::NotInstances(other)),
        }
    }
}

impl Source for InstanceStream {
    type Payload = Instance;

    fn has_next(&mut self) -> bool {
        self.0.has_next()
    }

    fn next_envelope(&mut self) -> Result<Envelope<Instance>> {
        self.0.next_envelope()?.try_map(Instance::from_payload)
    }
}

/// Run `folds`-fold training of [`LabelTally`] learners over a data file.
///
/// The input is reopened for every pass, so it is streamed rather than
/// loaded. Records are assigned to folds by their position among the
/// non-empty input lines.
pub fn execute_folds(
    input: &Path,
    pipeline_text: &str,
    folds: usize,
    chunk_size: usize,
) -> std::result::Result<Vec<FoldOutcome<LabelTally>>, FoldError> {
    let commands = parse_commands(pipeline_text)?;
    let plan = FoldPlan::new(folds)?;
    let trainer = ChunkedTrainer::new(chunk_size)?;

    // Reject a description that cannot feed a learner before any fold runs.
    InstanceStream::new(build_pipeline(&commands, LineSource::from_text(""))?)?;

    run_folds(
        plan,
        trainer,
        || Ok(LineSource::open(input)?.numbered()),
        |filtered| {
            let pipeline = build_pipeline(&commands, filtered)?;
            InstanceStream::new(pipeline).map_err(|e| PipeError::InvalidPipeline(e.to_string()))
        },
        |_| LabelTally::new(),
    )
}
