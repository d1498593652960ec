//! # Safety Gate
//!
//! Structural policy enforcement for classified commands. The gate never
//! judges what a command *means*; it enforces a closed action whitelist and,
//! for `open_file`, a closed path whitelist. That holds even if the
//! classifier upstream is wrong or compromised.
//!
//! - [`Policy`]: the static whitelists plus the global confirmation toggle
//! - [`evaluate`]: the pure decision function
//! - [`PolicyHandle`]: shared, read-mostly policy with a single update entry point

mod gate;
mod policy;

pub use gate::{evaluate, DecisionReason, SafetyDecision};
pub use policy::{Policy, PolicyError, PolicyHandle};
