//! The submission pipeline: bounded retry submission, receipt monitoring,
//! and the relay-first / self-paid fallback orchestration.

mod monitor;
mod orchestrator;
mod submit;

pub(crate) use orchestrator::Orchestrator;
pub use orchestrator::SessionCallSubmission;
