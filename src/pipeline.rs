//! Pipeline composition and driving.
//!
//! A pipeline is a source followed by zero or more stages, pulled one record
//! at a time: each pull takes one envelope from the source and threads it
//! through every stage in order. Nothing runs until the caller asks for the
//! next record, and a failing stage aborts only that pull.
//!
//! Two flavours share this model:
//! - [`Pipeline`] is typed. Appending a stage whose input type differs from
//!   the current output type is a compile error.
//! - [`DynPipeline`] is assembled from run-time descriptions. Each stage
//!   declares its [`PayloadKind`]s and [`DynPipelineBuilder::add_pipe`]
//!   fails with `PipeError::TypeMismatch` before any record flows.

use tracing::debug;

use crate::batch::{BatchStage, Batches};
use crate::envelope::Envelope;
use crate::error::{PipeError, Result};
use crate::payload::{Payload, PayloadKind, PayloadType};
use crate::source::{Envelopes, Source};
use crate::stage::{DynStage, Stage};
use crate::trace::RecordTrace;

type Chain<I, O> = Box<dyn Fn(Envelope<I>) -> Result<Envelope<O>> + Send>;

/// A typed, lazily evaluated chain of a source and stages.
///
/// # Example
///
/// ```
/// use instance_pipes::{Pipeline, Source, VecSource};
/// use instance_pipes::stages::{ParseColumns, SplitDelimited};
///
/// let source = VecSource::from_payloads(vec!["1,2,3,Iris-setosa".to_string()]);
/// let mut pipeline = Pipeline::new(source)
///     .add_pipe(SplitDelimited::new(','))
///     .add_pipe(ParseColumns::new(4).label_column(3));
///
/// let row = pipeline.next_envelope().unwrap();
/// assert_eq!(row.payload().to_dense(), vec![1.0, 2.0, 3.0]);
/// assert_eq!(row.label().unwrap().to_string(), "Iris-setosa");
/// ```
pub struct Pipeline<S: Source, O> {
    source: S,
    chain: Chain<S::Payload, O>,
    stage_names: Vec<String>,
}

impl<S> Pipeline<S, S::Payload>
where
    S: Source,
    S::Payload: 'static,
{
    /// Start a pipeline with no stages; it yields the source's envelopes.
    pub fn new(source: S) -> Self {
        Self {
            source,
            chain: Box::new(|envelope| Ok(envelope)),
            stage_names: Vec::new(),
        }
    }
}

impl<S, O> Pipeline<S, O>
where
    S: Source,
    S::Payload: 'static,
    O: 'static,
{
    /// Append a stage consuming the current output type.
    ///
    /// A stage whose input differs from the current output is rejected by
    /// the compiler, so a mismatched chain never gets to iterate:
    ///
    /// ```compile_fail
    /// use instance_pipes::{Pipeline, VecSource};
    /// use instance_pipes::stages::ParseColumns;
    ///
    /// // ParseColumns wants tokens, the source yields whole lines.
    /// let source = VecSource::from_payloads(vec!["1,2".to_string()]);
    /// let _ = Pipeline::new(source).add_pipe(ParseColumns::new(2));
    /// ```
    pub fn add_pipe<T>(self, stage: T) -> Pipeline<S, T::Out>
    where
        T: Stage<In = O> + Send + 'static,
        T::Out: 'static,
    {
        let Pipeline {
            source,
            chain,
            mut stage_names,
        } = self;
        let name = Stage::name(&stage).to_string();
        debug!(stage = %name, position = stage_names.len() + 1, "appended stage");
        stage_names.push(name);
        Pipeline {
            source,
            chain: Box::new(move |envelope| stage.operate(chain(envelope)?)),
            stage_names,
        }
    }
}

impl<S: Source, O> Pipeline<S, O> {
    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// The lazy sequence of fully processed envelopes.
    pub fn process(self) -> Envelopes<Self> {
        self.envelopes()
    }

    /// Group the output into batches of at most `max_count` records.
    pub fn batches<B>(self, stage: B, max_count: usize) -> Batches<Self, B>
    where
        B: BatchStage<In = O>,
    {
        Batches::new(self, stage, max_count)
    }
}

impl<S: Source, O> Source for Pipeline<S, O> {
    type Payload = O;

    fn has_next(&mut self) -> bool {
        self.source.has_next()
    }

    fn next_envelope(&mut self) -> Result<Envelope<O>> {
        let envelope = self.source.next_envelope()?;
        (self.chain)(envelope)
    }
}

// ---------------------------------------------------------------------------
// Description-driven pipelines
// ---------------------------------------------------------------------------

type DynSource = Box<dyn Source<Payload = Payload> + Send>;

/// Adapts a typed source to dynamic payloads.
struct Erased<S>(S);

impl<S> Source for Erased<S>
where
    S: Source,
    S::Payload: PayloadType,
{
    type Payload = Payload;

    fn has_next(&mut self) -> bool {
        self.0.has_next()
    }

    fn next_envelope(&mut self) -> Result<Envelope<Payload>> {
        Ok(self.0.next_envelope()?.map(PayloadType::into_payload))
    }
}

/// A pipeline of [`DynStage`]s, validated when assembled.
pub struct DynPipeline {
    source: DynSource,
    stages: Vec<Box<dyn DynStage>>,
    output_kind: PayloadKind,
}

/// Append-only builder for [`DynPipeline`].
pub struct DynPipelineBuilder {
    source: DynSource,
    stages: Vec<Box<dyn DynStage>>,
    tail: PayloadKind,
}

impl DynPipeline {
    /// Start building from a typed source; its payload kind seeds the check.
    pub fn builder<S>(source: S) -> DynPipelineBuilder
    where
        S: Source + Send + 'static,
        S::Payload: PayloadType,
    {
        DynPipelineBuilder {
            source: Box::new(Erased(source)),
            stages: Vec::new(),
            tail: S::Payload::KIND,
        }
    }

    /// Start building from a source of dynamic payloads of the given kind.
    pub fn builder_dyn(source: DynSource, kind: PayloadKind) -> DynPipelineBuilder {
        DynPipelineBuilder {
            source,
            stages: Vec::new(),
            tail: kind,
        }
    }

    pub fn output_kind(&self) -> PayloadKind {
        self.output_kind
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// The lazy sequence of fully processed envelopes.
    pub fn process(self) -> Envelopes<Self> {
        self.envelopes()
    }

    /// Pull one record and capture its payload at every pipe point.
    ///
    /// `pipe_points[0]` is the source output and `pipe_points[i]` the output
    /// of stage `i - 1`. On failure the points reached so far are returned
    /// together with the error.
    pub fn next_traced(&mut self) -> std::result::Result<RecordTrace, (RecordTrace, PipeError)> {
        let mut trace = RecordTrace::default();
        let mut envelope = match self.source.next_envelope() {
            Ok(envelope) => envelope,
            Err(e) => return Err((trace, e)),
        };
        trace.pipe_points.push(envelope.clone());
        for stage in &self.stages {
            envelope = match stage.operate_dyn(envelope) {
                Ok(next) => next,
                Err(e) => {
                    trace.failed_stage = Some(stage.name().to_string());
                    return Err((trace, e));
                }
            };
            trace.pipe_points.push(envelope.clone());
        }
        Ok(trace)
    }
}

impl DynPipelineBuilder {
    /// Append a stage. Fails with `PipeError::TypeMismatch` when the stage's
    /// input kind differs from the current output kind.
    pub fn add_pipe(mut self, stage: Box<dyn DynStage>) -> Result<Self> {
        if stage.input_kind() != self.tail {
            return Err(PipeError::TypeMismatch {
                stage: stage.name().to_string(),
                expected: stage.input_kind(),
                found: self.tail,
            });
        }
        self.tail = stage.output_kind();
        self.stages.push(stage);
        Ok(self)
    }

    /// Output kind of the chain assembled so far.
    pub fn output_kind(&self) -> PayloadKind {
        self.tail
    }

    pub fn build(self) -> DynPipeline {
        debug!(
            stages = ?self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            output = %self.tail,
            "built pipeline"
        );
        DynPipeline {
            source: self.source,
            stages: self.stages,
            output_kind: self.tail,
        }
    }
}

impl Source for DynPipeline {
    type Payload = Payload;

    fn has_next(&mut self) -> bool {
        self.source.has_next()
    }

    fn next_envelope(&mut self) -> Result<Envelope<Payload>> {
        let mut envelope = self.source.next_envelope()?;
        for stage in &self.stages {
            envelope = stage.operate_dyn(envelope)?;
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Label;
    use crate::source::{LineSource, VecSource};
    use crate::stage::map_stage;
    use crate::stages::{ParseColumns, SplitDelimited, ToInstance};
    use crate::vector::FeatureVector;

    fn rows(lines: &[&str]) -> VecSource<String> {
        VecSource::from_payloads(lines.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_empty_pipeline_yields_source() {
        let out: Vec<_> = Pipeline::new(rows(&["a", "b"]))
            .process()
            .map(|e| e.unwrap().into_payload())
            .collect();
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_iris_row_scenario() {
        let mut pipeline = Pipeline::new(rows(&["1,2,3,Iris-setosa"]))
            .add_pipe(SplitDelimited::new(','))
            .add_pipe(ParseColumns::new(4).label_column(3));
        let env = pipeline.next_envelope().unwrap();
        assert_eq!(env.payload(), &FeatureVector::Dense(vec![1.0, 2.0, 3.0]));
        assert_eq!(env.label(), Some(&Label::from("Iris-setosa")));
        assert!(!pipeline.has_next());
        assert_eq!(pipeline.stage_names(), ["SPLIT", "COLUMNS"]);
    }

    #[test]
    fn test_no_drop_parity() {
        let lines = ["1,2", "3,4", "5,6", "7,8"];
        let count = Pipeline::new(rows(&lines))
            .add_pipe(SplitDelimited::new(','))
            .add_pipe(ParseColumns::new(2))
            .process()
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(count, lines.len());
    }

    #[test]
    fn test_chained_stages_match_direct_parse() {
        let lines = ["0.5,1.5,2", "3,-4,5e-1", "0,0,7"];
        let chained: Vec<FeatureVector> = Pipeline::new(rows(&lines))
            .add_pipe(SplitDelimited::new(','))
            .add_pipe(ParseColumns::new(3))
            .process()
            .map(|r| r.unwrap().into_payload())
            .collect();
        let direct: Vec<FeatureVector> = lines
            .iter()
            .map(|l| FeatureVector::Dense(l.split(',').map(|t| t.parse().unwrap()).collect()))
            .collect();
        assert_eq!(chained, direct);
    }

    #[test]
    fn test_malformed_row_surfaces_and_pipeline_resumes() {
        let mut pipeline = Pipeline::new(LineSource::from_text("1,2,x,label\n4,5,6,ok\n").numbered())
            .add_pipe(SplitDelimited::new(','))
            .add_pipe(ParseColumns::new(4).label_column(3));
        let err = pipeline.next_envelope().unwrap_err();
        assert!(matches!(err, PipeError::MalformedRecord { .. }));
        assert!(pipeline.has_next());
        let next = pipeline.next_envelope().unwrap();
        assert_eq!(next.identifier(), Some("2"));
        assert_eq!(next.payload().to_dense(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_metadata_transparency_through_chain() {
        let source = VecSource::from_envelopes(vec![
            Envelope::new("2,4".to_string())
                .with_identifier("r1")
                .with_label(1.0)
                .with_weight(0.25),
        ]);
        let env = Pipeline::new(source)
            .add_pipe(map_stage("TRIM", |s: String| Ok(s.trim().to_string())))
            .add_pipe(SplitDelimited::new(','))
            .add_pipe(ParseColumns::new(2))
            .next_envelope_owned();
        assert_eq!(env.identifier(), Some("r1"));
        assert_eq!(env.label(), Some(&Label::Number(1.0)));
        assert_eq!(env.weight(), 0.25);
    }

    #[test]
    fn test_exhausted_pipeline() {
        let mut pipeline = Pipeline::new(rows(&[]));
        assert!(!pipeline.has_next());
        assert!(matches!(pipeline.next_envelope(), Err(PipeError::Exhausted)));
    }

    #[test]
    fn test_dyn_builder_rejects_mismatch_before_iteration() {
        let builder = DynPipeline::builder(rows(&["1,2"]));
        let err = builder
            .add_pipe(Box::new(ParseColumns::new(2)))
            .err()
            .unwrap();
        match err {
            PipeError::TypeMismatch {
                stage,
                expected,
                found,
            } => {
                assert_eq!(stage, "COLUMNS");
                assert_eq!(expected, PayloadKind::Tokens);
                assert_eq!(found, PayloadKind::Text);
            }
            other => panic!("Expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_dyn_builder_from_erased_source() {
        let source: Box<dyn Source<Payload = Payload> + Send> =
            Box::new(VecSource::from_payloads(vec![Payload::Tokens(vec![
                "3".to_string(),
                "4".to_string(),
            ])]));
        let builder = DynPipeline::builder_dyn(source, PayloadKind::Tokens);
        assert_eq!(builder.output_kind(), PayloadKind::Tokens);
        assert!(matches!(
            DynPipeline::builder_dyn(
                Box::new(VecSource::<Payload>::from_payloads(vec![])),
                PayloadKind::Text
            )
            .add_pipe(Box::new(ParseColumns::new(2))),
            Err(PipeError::TypeMismatch { .. })
        ));
        let mut pipeline = builder
            .add_pipe(Box::new(ParseColumns::new(2)))
            .unwrap()
            .build();
        let env = pipeline.next_envelope().unwrap();
        assert_eq!(env.payload().render(), "0:3 1:4");
        assert!(!pipeline.has_next());
    }

    #[test]
    fn test_dyn_pipeline_runs_to_instances() {
        let mut pipeline = DynPipeline::builder(rows(&["1,2,1", "3,4,-1"]))
            .add_pipe(Box::new(SplitDelimited::new(',')))
            .unwrap()
            .add_pipe(Box::new(ParseColumns::new(3).label_column(2)))
            .unwrap()
            .add_pipe(Box::new(ToInstance::new()))
            .unwrap()
            .build();
        assert_eq!(pipeline.output_kind(), PayloadKind::Instance);
        assert_eq!(pipeline.stage_names(), vec!["SPLIT", "COLUMNS", "INSTANCE"]);
        let rendered: Vec<String> = (&mut pipeline)
            .envelopes()
            .map(|e| e.unwrap().payload().render())
            .collect();
        assert_eq!(rendered, vec!["1 0:1 1:2", "-1 0:3 1:4"]);
    }

    #[test]
    fn test_next_traced_records_pipe_points() {
        let mut pipeline = DynPipeline::builder(rows(&["1,2", "1,y"]))
            .add_pipe(Box::new(SplitDelimited::new(',')))
            .unwrap()
            .add_pipe(Box::new(ParseColumns::new(2)))
            .unwrap()
            .build();
        let trace = pipeline.next_traced().unwrap();
        assert_eq!(trace.pipe_points.len(), 3);
        assert_eq!(trace.pipe_points[0].payload().kind(), PayloadKind::Text);
        assert_eq!(trace.pipe_points[2].payload().kind(), PayloadKind::Vector);

        let (partial, err) = pipeline.next_traced().unwrap_err();
        assert_eq!(partial.pipe_points.len(), 2);
        assert_eq!(partial.failed_stage.as_deref(), Some("COLUMNS"));
        assert!(err.is_record_error());
    }

    impl<S: Source, O> Pipeline<S, O> {
        fn next_envelope_owned(mut self) -> Envelope<O> {
            self.next_envelope().unwrap()
        }
    }
}
