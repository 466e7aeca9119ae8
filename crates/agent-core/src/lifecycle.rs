mod bootstrap;
mod ingest;
mod runtime;

pub use runtime::AgentRuntime;
