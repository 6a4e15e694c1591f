//! Record transformation and the batch runner that drives a normalization
//! run end to end.

pub mod bootstrap;
pub mod error;
pub mod runner;
pub mod shutdown;
pub mod transformer;

pub use bootstrap::{build_pipeline, build_resolver, Pipeline};
pub use error::{BootstrapError, RunnerError, TransformError};
pub use runner::{BatchRunner, RunOutcome, RunPhase, RunRequest, RunnerSettings, SkipReason};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use transformer::RecordTransformer;
