// llm-client-rs/src/lib.rs
// Client for the external classification service

mod llm_client;
pub mod os;
pub mod prompts;

pub use llm_client::{is_retryable, LLMClient, LLMError, LanguageModel, LlmConfig};
pub use os::detect_os_distro;
pub use prompts::{classification_prompt, summary_prompt, Prompt, REFUSAL_TEXT};
