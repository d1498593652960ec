//! # Nova request pipeline
//!
//! Turns one line of natural-language input into either a conversational
//! reply or a gated, optionally confirmed, executed command whose output is
//! explained back to the operator.
//!
//! ```text
//! text -> classify -> validate -> Conversation -> reply
//!                              -> Command -> gate -> [confirm] -> execute -> summarize -> reply
//! ```
//!
//! Each request runs as its own task under a bounded worker pool. Every
//! request ends in exactly one terminal state, emits exactly one message to
//! the [`PresentationSink`] and exactly one record to the interaction sink.

mod confirmation;
mod error;
mod pipeline;
mod presentation;
mod state;
mod summarizer;

pub use confirmation::{
    ChannelConfirmationPrompt, ConfirmationBroker, ConfirmationOutcome, ConfirmationPrompt,
    ConfirmationRequest, PendingConfirmation,
};
pub use error::PipelineError;
pub use pipeline::{
    PipelineDeps, PipelineOrchestrator, PipelineReport, PipelineSettings, RequestHandle,
};
pub use presentation::{messages, MessageSource, PresentationSink};
pub use state::{AssistantMood, PipelineState};
pub use summarizer::Summarizer;
