//! Schema validation of raw classifier responses
//!
//! The classifier is untrusted: its output is checked field by field against
//! a closed shape instead of being handed to a lenient deserializer.

use serde_json::{Map, Value};

use crate::errors::{ParseError, ParseResult};
use crate::intent::{Action, Command, Conversation, Intent};

const COMMAND_FIELDS: [&str; 5] = ["type", "action", "target", "confirm", "safe"];
const CONVERSATION_FIELDS: [&str; 2] = ["type", "response"];

/// Validate `raw` against the two permitted intent shapes.
///
/// Pure: no side effects. Leading and trailing whitespace is tolerated, any
/// other surrounding text (prose, markdown fences) is a [`ParseError`].
pub fn parse(raw: &str) -> ParseResult<Intent> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let object = match &value {
        Value::Object(map) => map,
        other => return Err(ParseError::NotAnObject(json_type_name(other))),
    };

    let kind = match object.get("type") {
        None => return Err(ParseError::MissingDiscriminator),
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(ParseError::WrongType {
                field: "type",
                expected: "string",
            })
        }
    };

    let intent = match kind {
        "command" => {
            reject_unexpected(object, &COMMAND_FIELDS)?;
            Intent::Command(parse_command(object)?)
        }
        "conversation" => {
            reject_unexpected(object, &CONVERSATION_FIELDS)?;
            Intent::Conversation(Conversation {
                response: required_string(object, "conversation", "response")?,
            })
        }
        other => return Err(ParseError::UnknownType(other.to_string())),
    };

    log::debug!("Validated {} intent", intent.kind());
    Ok(intent)
}

fn parse_command(object: &Map<String, Value>) -> ParseResult<Command> {
    let action = required_string(object, "command", "action")?;
    let action = action.parse::<Action>()?;

    Ok(Command {
        action,
        target: required_string(object, "command", "target")?,
        confirm: required_bool(object, "command", "confirm")?,
        safe: required_bool(object, "command", "safe")?,
    })
}

fn reject_unexpected(object: &Map<String, Value>, allowed: &[&str]) -> ParseResult<()> {
    // Report the first offender in key order so errors are stable
    let mut extras: Vec<&String> = object
        .keys()
        .filter(|k| !allowed.contains(&k.as_str()))
        .collect();
    extras.sort();

    match extras.first() {
        Some(field) => Err(ParseError::UnexpectedField((*field).clone())),
        None => Ok(()),
    }
}

fn required_string(
    object: &Map<String, Value>,
    variant: &'static str,
    field: &'static str,
) -> ParseResult<String> {
    match object.get(field) {
        None => Err(ParseError::MissingField { variant, field }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn required_bool(
    object: &Map<String, Value>,
    variant: &'static str,
    field: &'static str,
) -> ParseResult<bool> {
    match object.get(field) {
        None => Err(ParseError::MissingField { variant, field }),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "boolean",
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
