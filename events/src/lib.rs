//! Wire types for the planning relay.
//!
//! This crate defines the notification message exchanged between the CRUD
//! backend and the relay, plus the small amount of routing vocabulary built
//! on top of it (reserved topics, forced-disconnect targets, the per-user
//! profile narrowing).
//!
//! This crate has no dependencies on internal crates. Notification payloads
//! are carried as serialized JSON values and decoded exactly once at the
//! ingest boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Topic whose notifications are additionally redirected to the affected
/// user as a narrowed `user` event.
pub const TOPIC_ADMIN_USERS: &str = "admin/users";

/// Topic carrying session administration messages; combined with
/// [`TYPE_CLOSE`] it forces client disconnection instead of fanning out.
pub const TOPIC_ADMIN_SESSIONS: &str = "admin/sessions";

/// Topic name of the derived per-user profile notification.
pub const TOPIC_USER: &str = "user";

/// Reserved action tag: never fanned out, only used for forced disconnects.
pub const TYPE_CLOSE: &str = "close";

/// Profile fields that survive the `admin/users` -> `user` narrowing.
/// Everything else in the original payload (password hashes included) is
/// dropped before the event reaches the affected user's browser.
const PROFILE_FIELDS: [&str; 4] = ["login", "nom", "roles", "statut"];

/// Subject identifier of a changed resource. The backend sends either a
/// string or a number depending on the table, so both decode transparently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Text(String),
    Number(i64),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubjectId::Text(s) => write!(f, "{s}"),
            SubjectId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One "a row changed" message from the trusted backend.
///
/// `origin` is the connection id of the browser tab that caused the change.
/// It is consumed by the router for self-exclusion and is never serialized,
/// so it cannot leak to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Topic name, matched verbatim against client subscriptions.
    pub name: String,
    /// Action tag: `create`, `update`, `patch`, `delete`, `close`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Subject id of the changed resource, or an encoded disconnect target.
    pub id: SubjectId,
    /// Optional payload, opaque to the relay outside the `admin/users` case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Originating connection id, excluded from fan-out. Write-only on the
    /// wire: deserialized from the backend, never serialized back out.
    #[serde(default, skip_serializing)]
    pub origin: Option<String>,
}

impl Notification {
    /// Derive the `user` notification delivered to the affected user when an
    /// `admin/users` row changes. `data` is narrowed to the public profile
    /// fields, with `uid` set from the notification's subject id.
    pub fn profile_for_user(&self) -> Notification {
        let data = self.data.as_ref().map(|data| {
            let mut narrowed = serde_json::Map::new();
            narrowed.insert(
                "uid".to_string(),
                serde_json::to_value(&self.id).unwrap_or(Value::Null),
            );
            for field in PROFILE_FIELDS {
                if let Some(value) = data.get(field) {
                    narrowed.insert(field.to_string(), value.clone());
                }
            }
            Value::Object(narrowed)
        });

        Notification {
            name: TOPIC_USER.to_string(),
            kind: self.kind.clone(),
            id: self.id.clone(),
            data,
            origin: None,
        }
    }

    /// Whether this notification is the reserved forced-disconnect message.
    pub fn is_forced_disconnect(&self) -> bool {
        self.name == TOPIC_ADMIN_SESSIONS && self.kind == TYPE_CLOSE
    }
}

/// Target of a forced-disconnect notification, encoded in the `id` field as
/// `uid:<userId>` or `sid:<sessionId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectTarget {
    /// Close every connection belonging to this user.
    User(String),
    /// Close the single connection authenticated by this session.
    Session(String),
}

impl DisconnectTarget {
    /// Parse an encoded target; returns `None` for unknown encodings, which
    /// callers log and ignore.
    pub fn parse(raw: &str) -> Option<DisconnectTarget> {
        if let Some(user_id) = raw.strip_prefix("uid:") {
            return Some(DisconnectTarget::User(user_id.to_string()));
        }
        if let Some(session_id) = raw.strip_prefix("sid:") {
            return Some(DisconnectTarget::Session(session_id.to_string()));
        }
        None
    }
}
