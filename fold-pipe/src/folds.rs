//! Fold assignment and parallel per-fold training.
//!
//! Record `i` of a source belongs to fold `i % folds`. Every fold gets its
//! own freshly opened sources and its own pipelines, so folds share no
//! mutable state and run in parallel on the rayon pool.

use instance_pipes::{Envelope, Instance, PipeError, Result, Source};
use rayon::prelude::*;
use tracing::info;

use crate::chunks::{ChunkReport, ChunkedTrainer};
use crate::error::FoldError;
use crate::learner::Learner;

/// Which records of a fold a filter keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Every record outside the fold.
    Train,
    /// Only the fold's own records.
    Test,
}

/// Round-robin split of a record stream into `folds` folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldPlan {
    folds: usize,
}

impl FoldPlan {
    pub fn new(folds: usize) -> std::result::Result<Self, FoldError> {
        if folds < 2 {
            return Err(FoldError::InvalidFolds(folds));
        }
        Ok(Self { folds })
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn fold_of(&self, record_index: usize) -> usize {
        record_index % self.folds
    }
}

/// Source adapter keeping one side of one fold.
///
/// Records are counted as they are pulled from the inner source, before any
/// stage runs, so the same record lands in the same fold on every pass.
/// Errors from the inner source are passed on whichever side they fall.
pub struct FoldFilter<S: Source> {
    inner: S,
    plan: FoldPlan,
    fold: usize,
    side: Side,
    index: usize,
    peeked: Option<Result<Envelope<S::Payload>>>,
}

impl<S: Source> FoldFilter<S> {
    pub fn new(inner: S, plan: FoldPlan, fold: usize, side: Side) -> Self {
        Self {
            inner,
            plan,
            fold,
            side,
            index: 0,
            peeked: None,
        }
    }

    pub fn training(inner: S, plan: FoldPlan, fold: usize) -> Self {
        Self::new(inner, plan, fold, Side::Train)
    }

    pub fn testing(inner: S, plan: FoldPlan, fold: usize) -> Self {
        Self::new(inner, plan, fold, Side::Test)
    }

    fn keeps(&self, record_index: usize) -> bool {
        let in_fold = self.plan.fold_of(record_index) == self.fold;
        match self.side {
            Side::Test => in_fold,
            Side::Train => !in_fold,
        }
    }

    fn fill(&mut self) {
        while self.peeked.is_none() && self.inner.has_next() {
            let index = self.index;
            self.index += 1;
            match self.inner.next_envelope() {
                Ok(envelope) if self.keeps(index) => self.peeked = Some(Ok(envelope)),
                Ok(_) => {}
                Err(e) => self.peeked = Some(Err(e)),
            }
        }
    }
}

impl<S: Source> Source for FoldFilter<S> {
    type Payload = S::Payload;

    fn has_next(&mut self) -> bool {
        self.fill();
        self.peeked.is_some()
    }

    fn next_envelope(&mut self) -> Result<Envelope<S::Payload>> {
        self.fill();
        self.peeked.take().unwrap_or(Err(PipeError::Exhausted))
    }
}

/// What one fold produced.
#[derive(Debug, Clone)]
pub struct FoldOutcome<L> {
    pub fold: usize,
    pub learner: L,
    pub train: ChunkReport,
    pub test: ChunkReport,
}

/// Train and test one learner per fold, folds in parallel.
///
/// `open` produces a fresh raw source for each pass; `build` wraps a fold
/// filter over it in the stages that yield instances. Outcomes come back in
/// fold order. The first failing fold's error is returned.
pub fn run_folds<S, P, L, Open, Build, Make>(
    plan: FoldPlan,
    trainer: ChunkedTrainer,
    open: Open,
    build: Build,
    make_learner: Make,
) -> std::result::Result<Vec<FoldOutcome<L>>, FoldError>
where
    S: Source,
    P: Source<Payload = Instance>,
    L: Learner + Send,
    Open: Fn() -> Result<S> + Sync,
    Build: Fn(FoldFilter<S>) -> Result<P> + Sync,
    Make: Fn(usize) -> L + Sync,
{
    (0..plan.folds())
        .into_par_iter()
        .map(|fold| -> std::result::Result<FoldOutcome<L>, FoldError> {
            info!(fold, folds = plan.folds(), "fold started");
            let mut learner = make_learner(fold);

            let training = build(FoldFilter::training(open()?, plan, fold))?;
            let train = trainer.train(training, &mut learner)?;

            let testing = build(FoldFilter::testing(open()?, plan, fold))?;
            let test = trainer.test(testing, &mut learner)?;

            info!(
                fold,
                train_instances = train.instances,
                test_instances = test.instances,
                "fold finished"
            );
            Ok(FoldOutcome {
                fold,
                learner,
                train,
                test,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::LabelTally;
    use instance_pipes::stages::{ParseSparseLine, ToInstance};
    use instance_pipes::{Pipeline, VecSource};

    fn numbers(n: usize) -> VecSource<usize> {
        VecSource::from_payloads(0..n)
    }

    fn drain<S: Source>(source: S) -> Vec<S::Payload> {
        source.envelopes().map(|e| e.unwrap().into_payload()).collect()
    }

    #[test]
    fn test_plan_rejects_single_fold() {
        assert!(matches!(FoldPlan::new(1), Err(FoldError::InvalidFolds(1))));
        assert_eq!(FoldPlan::new(3).unwrap().fold_of(7), 1);
    }

    #[test]
    fn test_filter_sides_partition_the_source() {
        let plan = FoldPlan::new(3).unwrap();
        let test = drain(FoldFilter::testing(numbers(8), plan, 1));
        let train = drain(FoldFilter::training(numbers(8), plan, 1));
        assert_eq!(test, vec![1, 4, 7]);
        assert_eq!(train, vec![0, 2, 3, 5, 6]);
    }

    #[test]
    fn test_filter_on_empty_source() {
        let plan = FoldPlan::new(2).unwrap();
        let mut filter = FoldFilter::testing(numbers(0), plan, 0);
        assert!(!filter.has_next());
        assert!(matches!(filter.next_envelope(), Err(PipeError::Exhausted)));
    }

    fn lines(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("{} {}:1", if i % 3 == 0 { -1 } else { 1 }, i % 8))
            .collect()
    }

    #[test]
    fn test_run_folds_covers_every_record_once_per_side() {
        let plan = FoldPlan::new(4).unwrap();
        let trainer = ChunkedTrainer::new(3).unwrap();
        let outcomes = run_folds(
            plan,
            trainer,
            || Ok(VecSource::from_payloads(lines(22))),
            |filtered| {
                Ok(Pipeline::new(filtered)
                    .add_pipe(ParseSparseLine::new(8))
                    .add_pipe(ToInstance::new()))
            },
            |_| LabelTally::new(),
        )
        .unwrap();

        assert_eq!(outcomes.len(), 4);
        let tested: usize = outcomes.iter().map(|o| o.test.instances).sum();
        assert_eq!(tested, 22);
        for outcome in &outcomes {
            assert_eq!(outcome.train.instances + outcome.test.instances, 22);
            assert_eq!(outcome.learner.train_count(), outcome.train.instances);
            assert_eq!(outcome.learner.test_count(), outcome.test.instances);
        }
        assert_eq!(outcomes[0].fold, 0);
        assert_eq!(outcomes[3].test.instances, 5);
    }

    #[test]
    fn test_run_folds_surfaces_open_failure() {
        let plan = FoldPlan::new(2).unwrap();
        let trainer = ChunkedTrainer::new(3).unwrap();
        let result = run_folds(
            plan,
            trainer,
            || -> Result<VecSource<String>> {
                Err(PipeError::resource(
                    "/missing.data",
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ))
            },
            |filtered| {
                Ok(Pipeline::new(filtered)
                    .add_pipe(ParseSparseLine::new(4))
                    .add_pipe(ToInstance::new()))
            },
            |_| LabelTally::new(),
        );
        assert!(matches!(result, Err(FoldError::Pipe(PipeError::Resource { .. }))));
    }
}
