//! # Intent Schema
//!
//! The structured interpretation of a natural-language request and the
//! validator that turns a raw classifier response into one.
//!
//! A classifier response is accepted only when it is exactly one JSON object
//! in one of two shapes:
//!
//! ```text
//! {"type":"command","action":"open_file"|"shutdown"|"run_command","target":"...","confirm":true,"safe":true}
//! {"type":"conversation","response":"..."}
//! ```
//!
//! Unknown fields are rejected rather than ignored so that an injected
//! payload cannot smuggle extra directives through the pipeline.

mod errors;
mod intent;
mod validator;

pub use errors::{ParseError, ParseResult};
pub use intent::{Action, Command, Conversation, Intent};
pub use validator::parse;
