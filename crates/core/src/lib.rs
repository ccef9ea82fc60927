//! Clarify Core
//!
//! The tutoring dialogue pipeline: conversation history, timestamp alignment
//! of synthesized responses, comprehension feedback interpretation, and the
//! orchestrator that ties them to the generation and synthesis services.

pub mod alignment;
pub mod comprehension;
pub mod dialogue;
pub mod llm_client;
pub mod orchestrator;
pub mod speech;
