//! # Error Handling Framework
//!
//! Shared plumbing for the assistant's failure paths:
//!
//! - Structured logging with `tracing`, text or JSON, optional rolling file output
//! - Sanitization of error text before it reaches the operator or the audit log
//!

pub mod logging;
pub mod sanitization;

// Re-export commonly used items
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use sanitization::{sanitize_message, truncate_for_display};
