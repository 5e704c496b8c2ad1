//! Flows (§4.E/§4.F): orchestrate stages into the DAG for one document or
//! file id. A flow runs as a single non-blocking task launched by the
//! orchestrator (§4.G.1a/1b); a stage returning anything other than
//! [`crate::stages::StageOutcome::Advanced`] stops the flow at that point
//! and leaves the row for the next tick's sweep/redispatch to pick up (§7
//! "the orchestrator never itself fails a row").

mod document_flow;
mod file_flow;

pub use document_flow::run as document_flow;
pub use file_flow::run as file_flow;
