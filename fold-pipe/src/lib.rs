//! # fold-pipe
//!
//! Drives `instance-pipes` pipelines into a learner without holding the
//! whole data set in memory.
//!
//! - [`ChunkedTrainer`] hands a learner bounded batches of instances
//! - [`FoldPlan`] and [`FoldFilter`] split a record stream round-robin into folds
//! - [`run_folds`] trains one learner per fold, folds in parallel
//! - [`execute_folds`] does all of the above from a `.pipe` description
//!
//! Each fold opens its own sources and builds its own pipelines; pipelines
//! are never shared between threads.

pub mod chunks;
pub mod dsl;
pub mod error;
pub mod folds;
pub mod learner;

pub use chunks::{ChunkReport, ChunkedTrainer};
pub use dsl::{InstanceStream, execute_folds};
pub use error::FoldError;
pub use folds::{FoldFilter, FoldOutcome, FoldPlan, Side, run_folds};
pub use learner::{LabelTally, Learner};
