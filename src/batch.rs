//! Batching stages: fold a bounded run of records into one aggregate.
//!
//! A [`BatchStage`] pulls up to `max_count` envelopes from an upstream
//! source and reports how many it actually consumed, so a driver can tell
//! "batch full" apart from "source ran dry". An exhausted upstream yields an
//! empty aggregate rather than an error; drivers check
//! [`Source::has_next`] before asking for another batch, which is what
//! [`Batches`] does.
//!
//! A failing upstream record ends the batch early. The records pulled before
//! it stay in the aggregate and the error travels alongside it, so nothing
//! well-formed is lost when the caller resumes past the failure.

use std::marker::PhantomData;

use tracing::trace;

use crate::envelope::Envelope;
use crate::error::{PipeError, Result};
use crate::instance::{Instance, InstanceCollection};
use crate::source::Source;

/// The aggregate produced by one batch together with its consumed count.
///
/// `consumed` counts the records held in the aggregate. When `error` is set
/// the batch stopped at a failing upstream record, which is not counted.
#[derive(Debug)]
pub struct BatchOutput<T> {
    pub envelope: Envelope<T>,
    pub consumed: usize,
    pub error: Option<PipeError>,
}

impl<T> BatchOutput<T> {
    pub fn into_payload(self) -> T {
        self.envelope.into_payload()
    }
}

/// A many-to-one stage.
pub trait BatchStage {
    type In;
    type Out;

    /// The display name of this stage.
    fn name(&self) -> &str;

    /// Consume up to `max_count` envelopes from `upstream` into one aggregate.
    ///
    /// A failing upstream record stops the batch; it is reported in
    /// [`BatchOutput::error`] next to the records consumed before it.
    fn operate(
        &self,
        upstream: &mut dyn Source<Payload = Self::In>,
        max_count: usize,
    ) -> Result<BatchOutput<Self::Out>>;
}

/// Pull up to `max_count` envelopes, handing each to `sink`. Stops at the
/// first failing record and returns its error with the count so far.
fn drain_into<T>(
    upstream: &mut dyn Source<Payload = T>,
    max_count: usize,
    mut sink: impl FnMut(Envelope<T>),
) -> (usize, Option<PipeError>) {
    let mut consumed = 0;
    while consumed < max_count && upstream.has_next() {
        match upstream.next_envelope() {
            Ok(envelope) => {
                sink(envelope);
                consumed += 1;
            }
            Err(e) => return (consumed, Some(e)),
        }
    }
    (consumed, None)
}

/// Collects payloads into a `Vec`.
pub struct Collect<T> {
    _payload: PhantomData<fn(T)>,
}

impl<T> Collect<T> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<T> Default for Collect<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BatchStage for Collect<T> {
    type In = T;
    type Out = Vec<T>;

    fn name(&self) -> &str {
        "COLLECT"
    }

    fn operate(
        &self,
        upstream: &mut dyn Source<Payload = T>,
        max_count: usize,
    ) -> Result<BatchOutput<Vec<T>>> {
        let mut items = Vec::new();
        let (consumed, error) = drain_into(upstream, max_count, |e| items.push(e.into_payload()));
        trace!(consumed, max_count, stopped = error.is_some(), "collected batch");
        Ok(BatchOutput {
            envelope: Envelope::new(items),
            consumed,
            error,
        })
    }
}

/// Assembles instance envelopes into an [`InstanceCollection`].
///
/// The envelope's weight and identifier are copied onto each instance so
/// the learner sees the metadata assigned upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceCollector;

impl BatchStage for InstanceCollector {
    type In = Instance;
    type Out = InstanceCollection;

    fn name(&self) -> &str {
        "COLLECT-INSTANCES"
    }

    fn operate(
        &self,
        upstream: &mut dyn Source<Payload = Instance>,
        max_count: usize,
    ) -> Result<BatchOutput<InstanceCollection>> {
        let mut batch = InstanceCollection::with_capacity(max_count.min(1024));
        let (consumed, error) = drain_into(upstream, max_count, |envelope| {
            let weight = envelope.weight();
            let identifier = envelope.identifier().map(str::to_string);
            let mut instance = envelope.into_payload();
            instance.weight = weight;
            if identifier.is_some() {
                instance.identifier = identifier;
            }
            batch.push(instance);
        });
        trace!(consumed, max_count, stopped = error.is_some(), "assembled instance batch");
        Ok(BatchOutput {
            envelope: Envelope::new(batch),
            consumed,
            error,
        })
    }
}

/// Iterator over successive batches of a source.
///
/// Stops as soon as the source reports no more records, so it never yields
/// a trailing empty batch. A `max_count` of zero yields nothing.
///
/// When a record fails mid-batch the records before it are yielded as an
/// `Ok` batch and the error follows as the next item. Calling `next` again
/// after an error resumes with the record after the failing one.
pub struct Batches<S, B> {
    source: S,
    stage: B,
    max_count: usize,
    pending: Option<PipeError>,
}

impl<S, B> Batches<S, B> {
    pub fn new(source: S, stage: B, max_count: usize) -> Self {
        Self {
            source,
            stage,
            max_count,
            pending: None,
        }
    }
}

impl<S, B> Iterator for Batches<S, B>
where
    S: Source,
    B: BatchStage<In = S::Payload>,
{
    type Item = Result<BatchOutput<B::Out>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        if self.max_count == 0 || !self.source.has_next() {
            return None;
        }
        let mut output = match self.stage.operate(&mut self.source, self.max_count) {
            Ok(output) => output,
            Err(e) => return Some(Err(e)),
        };
        match output.error.take() {
            Some(e) if output.consumed == 0 => Some(Err(e)),
            Some(e) => {
                self.pending = Some(e);
                Some(Ok(output))
            }
            None => Some(Ok(output)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipeError;
    use crate::pipeline::Pipeline;
    use crate::source::VecSource;
    use crate::stages::{ParseSparseLine, ToInstance};
    use crate::vector::{FeatureVector, Layout};

    fn instances(n: usize) -> VecSource<Instance> {
        VecSource::from_envelopes((0..n).map(|i| {
            Envelope::new(Instance::new(FeatureVector::zeros(2, Layout::Sparse), 1.0))
                .with_identifier(i.to_string())
                .with_weight(0.5)
        }))
    }

    #[test]
    fn test_batch_stops_at_max_count() {
        let mut src = instances(5);
        let out = InstanceCollector.operate(&mut src, 3).unwrap();
        assert_eq!(out.consumed, 3);
        assert_eq!(out.envelope.payload().len(), 3);
        assert_eq!(src.remaining(), 2);
    }

    #[test]
    fn test_short_source_yields_partial_batch_and_exhausts() {
        let mut src = instances(2);
        let out = InstanceCollector.operate(&mut src, 10).unwrap();
        assert_eq!(out.consumed, 2);
        assert!(!src.has_next());
    }

    #[test]
    fn test_exhausted_source_yields_empty_batch() {
        let mut src = instances(0);
        let out = InstanceCollector.operate(&mut src, 4).unwrap();
        assert_eq!(out.consumed, 0);
        assert!(out.into_payload().is_empty());
    }

    #[test]
    fn test_collector_copies_envelope_metadata() {
        let mut src = instances(1);
        let batch = InstanceCollector.operate(&mut src, 1).unwrap().into_payload();
        let inst = batch.iter().next().unwrap();
        assert_eq!(inst.weight, 0.5);
        assert_eq!(inst.identifier.as_deref(), Some("0"));
    }

    #[test]
    fn test_batches_iterator_has_no_trailing_empty_batch() {
        let sizes: Vec<usize> = Batches::new(instances(7), InstanceCollector, 3)
            .map(|b| b.unwrap().consumed)
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_batches_zero_max_count_yields_nothing() {
        assert_eq!(Batches::new(instances(3), InstanceCollector, 0).count(), 0);
    }

    #[test]
    fn test_collect_generic_payloads() {
        let mut src = VecSource::from_payloads(vec![1, 2, 3]);
        let out = Collect::<i32>::new().operate(&mut src, 2).unwrap();
        assert_eq!(out.into_payload(), vec![1, 2]);
    }

    struct Failing;

    impl Source for Failing {
        type Payload = Instance;

        fn has_next(&mut self) -> bool {
            true
        }

        fn next_envelope(&mut self) -> Result<Envelope<Instance>> {
            Err(PipeError::malformed("??", "bad row"))
        }
    }

    #[test]
    fn test_failing_record_ends_batch() {
        let out = InstanceCollector.operate(&mut Failing, 3).unwrap();
        assert_eq!(out.consumed, 0);
        assert!(out.error.unwrap().is_record_error());
    }

    #[test]
    fn test_partial_batch_kept_when_record_fails() {
        let mut src = Pipeline::new(VecSource::from_payloads(
            ["1 1", "1 2", "bad", "1 3"].map(String::from),
        ))
        .add_pipe(ParseSparseLine::new(8))
        .add_pipe(ToInstance::new());
        let out = InstanceCollector.operate(&mut src, 3).unwrap();
        assert_eq!(out.consumed, 2);
        assert_eq!(out.envelope.payload().len(), 2);
        assert!(matches!(out.error, Some(PipeError::MalformedRecord { .. })));
        assert!(src.has_next());
    }

    #[test]
    fn test_batches_deliver_every_good_record_across_errors() {
        let lines = ["1 1", "1 2", "bad", "1 3", "oops", "bad", "1 4", "1 5"];
        let pipeline = Pipeline::new(VecSource::from_payloads(lines.map(String::from)))
            .add_pipe(ParseSparseLine::new(8))
            .add_pipe(ToInstance::new());
        let mut delivered = Vec::new();
        let mut errors = 0;
        for batch in pipeline.batches(InstanceCollector, 3) {
            match batch {
                Ok(batch) => delivered.push(batch.consumed),
                Err(e) => {
                    assert!(e.is_record_error());
                    errors += 1;
                }
            }
        }
        assert_eq!(delivered, vec![2, 1, 2]);
        assert_eq!(delivered.iter().sum::<usize>(), 5);
        assert_eq!(errors, 3);
    }
}
