//! The single-record stage abstraction.
//!
//! A [`Stage`] turns one `Envelope<In>` into one `Envelope<Out>`. Its input
//! and output payload types are associated types, so a typed
//! [`Pipeline`](crate::Pipeline) only accepts a stage whose `In` equals the
//! current tail type. For description-driven pipelines every stage with
//! kinded payloads is also a [`DynStage`].

use std::marker::PhantomData;

use crate::envelope::Envelope;
use crate::error::Result;
use crate::payload::{Payload, PayloadKind, PayloadType};

/// A record-at-a-time transformation.
///
/// Stages hold only configuration fixed at construction, so `operate` takes
/// `&self`. Metadata the stage does not own must be carried through
/// unchanged; [`Envelope::try_map`] does exactly that.
pub trait Stage {
    type In;
    type Out;

    /// The display name of this stage.
    fn name(&self) -> &str;

    /// Transform one envelope.
    fn operate(&self, envelope: Envelope<Self::In>) -> Result<Envelope<Self::Out>>;
}

/// A stage built from a payload function. Metadata passes through.
pub struct FnStage<I, O, F> {
    name: String,
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

/// Wrap a fallible payload function as a stage.
pub fn map_stage<I, O, F>(name: impl Into<String>, f: F) -> FnStage<I, O, F>
where
    F: Fn(I) -> Result<O>,
{
    FnStage {
        name: name.into(),
        f,
        _types: PhantomData,
    }
}

impl<I, O, F> Stage for FnStage<I, O, F>
where
    F: Fn(I) -> Result<O>,
{
    type In = I;
    type Out = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn operate(&self, envelope: Envelope<I>) -> Result<Envelope<O>> {
        envelope.try_map(&self.f)
    }
}

/// A stage whose payload kinds are checked when a pipeline is assembled
/// rather than by the compiler.
pub trait DynStage: Send {
    fn name(&self) -> &str;

    fn input_kind(&self) -> PayloadKind;

    fn output_kind(&self) -> PayloadKind;

    fn operate_dyn(&self, envelope: Envelope<Payload>) -> Result<Envelope<Payload>>;
}

impl<S> DynStage for S
where
    S: Stage + Send,
    S::In: PayloadType,
    S::Out: PayloadType,
{
    fn name(&self) -> &str {
        Stage::name(self)
    }

    fn input_kind(&self) -> PayloadKind {
        S::In::KIND
    }

    fn output_kind(&self) -> PayloadKind {
        S::Out::KIND
    }

    fn operate_dyn(&self, envelope: Envelope<Payload>) -> Result<Envelope<Payload>> {
        let typed = envelope.try_map(S::In::from_payload)?;
        Ok(self.operate(typed)?.map(PayloadType::into_payload))
    }
}
