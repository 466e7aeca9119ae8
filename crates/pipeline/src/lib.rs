mod config;
mod errors;
mod escalation;
mod oracles;
mod priority;
mod status;
mod submission;
mod workers;

pub use config::{PipelineConfig, PipelineConfigError};
pub use errors::{ErrorClass, PipelineError, PipelineResult, ProcessingError, Rejection, Stage};
pub use escalation::{EscalationPipeline, PipelineParts, StepOutcome, StepReport};
pub use oracles::Oracles;
pub use priority::derive_priority;
pub use status::{StatusSnapshot, SweepReport};
pub use submission::{ProcessingOutcome, Submission, VerdictHandle};
pub use workers::WorkerPool;
