// action-ledger-rs/src/lib.rs
// Audit trail for handled requests.
//
// Every request that reaches a terminal state produces exactly one
// InteractionRecord. Records go to an InteractionSink:
//
// - TracingSink writes a structured log event
// - LedgerSink hands records to a background writer that appends them to an
//   ActionLedger file, one JSON object per line, each entry carrying a
//   SHA-256 hash chained to its predecessor for tamper detection
//
// Sinks never block the caller and never fail the request.

mod ledger;
mod record;
mod sink;

pub use ledger::{ActionLedger, LedgerEntry, LedgerError, GENESIS_HASH};
pub use record::{InteractionOutcome, InteractionRecord, RecordId};
pub use sink::{CompositeSink, InteractionSink, LedgerSink, LedgerWriter, TracingSink};
