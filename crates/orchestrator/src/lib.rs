//! Query Orchestrator (§4.4): the single and streaming query pipelines that
//! fan prompts out to the agent runtime, inject/extract memory, and persist
//! sessions and transcripts.

pub mod events;
pub mod pipeline;

pub use events::OrchestratorEvent;
pub use pipeline::{
    CancellationSignal, Orchestrator, QueryRequest, SingleQueryOutcome, EVENT_CHANNEL_DEPTH,
};
