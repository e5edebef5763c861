pub mod export;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod prompts;

#[cfg(test)]
pub mod testing;
