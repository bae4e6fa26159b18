pub mod embedder;
pub mod inbox;
pub mod llm;
