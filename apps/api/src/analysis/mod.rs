//! Resume analysis: PDF text extraction, ATS scoring via the LLM client, and result storage.

pub mod extract;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod scoring;
pub mod store;
