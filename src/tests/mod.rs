//! Scenario tests (§8): each file drives one lettered end-to-end scenario
//! through the real stages and flows, with the LLM and OCR providers
//! replaced by wiremock responders.

pub mod common;

mod concurrent_summarize_serializes_test;
mod prompt_evolution_test;
mod single_bill_happy_path_test;
mod stuck_recovery_test;
