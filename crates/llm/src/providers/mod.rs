//! LLM runtime implementations.

pub mod ollama;

pub use ollama::OllamaClient;
