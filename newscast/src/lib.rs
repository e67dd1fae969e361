// Library interface for newscast modules
// This allows tests and the binary to import the pipeline stages

pub mod dedup;
pub mod digest;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod publish;
pub mod script;
pub mod tts;
