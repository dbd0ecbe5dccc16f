//! Model-host backends: the Ollama chat API and the AllHands query API, both
//! decoded from newline-delimited JSON into text increments.

mod allhands;
pub mod decoder;
mod ollama;
mod stream;

pub use allhands::AllHandsBackend;
pub use decoder::{DecoderState, NdjsonDecoder};
pub use ollama::{ModelInfo, OllamaBackend};
