//! Line-oriented console: parses what the user types and renders what the
//! server pushes.
//!
//! Input lines are either a request, `REQUEST_TYPE {json}`, or one of the
//! slash commands below. The JSON payload may be omitted for requests that
//! take no fields.

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};
use socialwire_core::{ConnectionState, PresenceEntry, ServerError};
use socialwire_protocol::events::{DirectMessage, FriendRequest, TimelinePost};
use socialwire_protocol::{Event, EventKind, RequestType};

/// Events printed as they arrive. Presence is printed from the online set.
pub const PRINTED_KINDS: [EventKind; 3] = [
    EventKind::NewMessage,
    EventKind::NewTimelineEvent,
    EventKind::FriendRequest,
];

pub const HELP: &str = "\
Commands:
  REQUEST_TYPE {json}   send a request, e.g. REQUEST_GET_FRIENDS {\"Limit\": 10}
  /online               list online users
  /state                show the connection state
  /requests             list request types
  /help                 show this help
  /quit                 disconnect and exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Request {
        request_type: RequestType,
        payload: Value,
    },
    Online,
    State,
    Requests,
    Help,
    Quit,
    Empty,
}

/// Parse one line of user input.
///
/// # Errors
///
/// Returns an error for unknown commands, unknown request types and payloads
/// that are not JSON objects.
pub fn parse_command(line: &str) -> Result<Input> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }

    if let Some(command) = line.strip_prefix('/') {
        return match command {
            "online" => Ok(Input::Online),
            "state" => Ok(Input::State),
            "requests" => Ok(Input::Requests),
            "help" | "?" => Ok(Input::Help),
            "quit" | "exit" => Ok(Input::Quit),
            other => bail!("Unknown command: /{other}"),
        };
    }

    let (tag, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let request_type: RequestType = tag
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| anyhow!("Unknown request type: {tag} (try /requests)"))?;

    let rest = rest.trim();
    let payload = if rest.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str::<Value>(rest).map_err(|e| anyhow!("Invalid JSON payload: {e}"))?
    };
    if !payload.is_object() {
        bail!("Payload must be a JSON object");
    }

    Ok(Input::Request {
        request_type,
        payload,
    })
}

/// Render a pushed event for the terminal.
#[must_use]
pub fn format_event(event: &Event) -> String {
    match event.kind {
        EventKind::NewMessage => match event.decode::<DirectMessage>() {
            Ok(msg) => format!("[message] from {}: {}", msg.user_from, msg.text),
            Err(_) => format_raw(event),
        },
        EventKind::NewTimelineEvent => match event.decode::<TimelinePost>() {
            Ok(post) => format!("[timeline] {}: {}", post.user_name, post.text),
            Err(_) => format_raw(event),
        },
        EventKind::FriendRequest => match event.decode::<FriendRequest>() {
            Ok(req) => format!("[friend request] for user {}", req.user_id),
            Err(_) => format_raw(event),
        },
        _ => format_raw(event),
    }
}

fn format_raw(event: &Event) -> String {
    format!("[{}] {}", event.kind.as_str(), event.payload)
}

#[must_use]
pub fn format_presence(online: &[PresenceEntry]) -> String {
    if online.is_empty() {
        return "[online] nobody".to_string();
    }

    let names: Vec<String> = online
        .iter()
        .map(|entry| format!("{} ({})", entry.display_name, entry.user_id))
        .collect();
    format!("[online] {}: {}", online.len(), names.join(", "))
}

#[must_use]
pub fn format_state(state: ConnectionState) -> String {
    format!("[state] {state}")
}

#[must_use]
pub fn format_server_error(error: &ServerError) -> String {
    format!("[error] {error}")
}

#[must_use]
pub fn format_reply(request_type: RequestType, reply: &Value) -> String {
    let body = serde_json::to_string_pretty(reply).unwrap_or_else(|_| reply.to_string());
    format!("[reply {request_type}]\n{body}")
}

/// All request tags, one per line.
#[must_use]
pub fn request_list() -> String {
    RequestType::ALL
        .iter()
        .map(RequestType::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}
