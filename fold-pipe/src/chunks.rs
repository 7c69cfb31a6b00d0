//! Chunked training: drive a pipeline in bounded batches.

use instance_pipes::{Batches, Instance, InstanceCollection, InstanceCollector, PipeError, Source};
use tracing::trace;

use crate::error::FoldError;
use crate::learner::Learner;

/// Totals from one pass over a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub chunks: usize,
    pub instances: usize,
}

/// Feeds a learner fixed-size chunks instead of the whole data set.
///
/// At most `chunk_size` instances are held in memory at a time. The final
/// chunk may be smaller; an empty pipeline produces no chunks at all. A
/// failing record ends the pass, after the learner has seen the instances
/// pulled ahead of it.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedTrainer {
    chunk_size: usize,
}

impl ChunkedTrainer {
    pub fn new(chunk_size: usize) -> Result<Self, FoldError> {
        if chunk_size == 0 {
            return Err(FoldError::InvalidChunkSize);
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Train `learner` on every chunk of `pipeline`.
    pub fn train<P, L>(&self, pipeline: P, learner: &mut L) -> Result<ChunkReport, PipeError>
    where
        P: Source<Payload = Instance>,
        L: Learner + ?Sized,
    {
        self.drive(pipeline, |batch| learner.train(batch))
    }

    /// Show `learner` every chunk of a held-out `pipeline`.
    pub fn test<P, L>(&self, pipeline: P, learner: &mut L) -> Result<ChunkReport, PipeError>
    where
        P: Source<Payload = Instance>,
        L: Learner + ?Sized,
    {
        self.drive(pipeline, |batch| learner.test(batch))
    }

    fn drive<P>(
        &self,
        pipeline: P,
        mut consume: impl FnMut(&InstanceCollection),
    ) -> Result<ChunkReport, PipeError>
    where
        P: Source<Payload = Instance>,
    {
        let mut report = ChunkReport::default();
        for batch in Batches::new(pipeline, InstanceCollector, self.chunk_size) {
            let batch = batch?;
            report.chunks += 1;
            report.instances += batch.consumed;
            trace!(chunk = report.chunks, size = batch.consumed, "chunk ready");
            consume(batch.envelope.payload());
        }
        Ok(report)
    }
}
