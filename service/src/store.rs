//! Read-only client for the external session store.
//!
//! The relay never owns authentication policy: it only resolves what the
//! store already knows. Two lookups exist, one per credential kind:
//! a session id resolves directly to a user id, and an API key resolves -
//! through a one-way hash - to a record carrying the key's owner and status.

use crate::config::Config;
use async_trait::async_trait;
use log::*;
use redis::AsyncCommands;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::error::Error as StdError;
use std::fmt;

/// Record stored for an API key, keyed by the hash of the key itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyRecord {
    pub uid: String,
    pub status: String,
}

impl ApiKeyRecord {
    /// Only active keys authenticate; revoked or suspended keys stay in the
    /// store but are refused here.
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Errors surfaced by session store lookups.
///
/// Callers decide containment per call site: on the authentication path a
/// store error degrades to an auth failure for that one request, never to a
/// process-level failure.
#[derive(Debug)]
pub enum StoreError {
    /// The store was unreachable or refused the command.
    Connection(String),
    /// The store answered, but the stored record did not decode.
    Decode(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "session store unreachable: {msg}"),
            StoreError::Decode(e) => write!(f, "malformed store record: {e}"),
        }
    }
}

impl StdError for StoreError {}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err)
    }
}

/// One-way hash under which API keys are stored: the plaintext key never
/// appears in the store.
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

/// Read-only lookups against the external session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a session id to its user id, if the session exists.
    async fn session_user(&self, session_id: &str) -> Result<Option<String>, StoreError>;

    /// Resolve a raw API key to its stored record, if the key is known.
    async fn api_key_record(&self, api_key: &str) -> Result<Option<ApiKeyRecord>, StoreError>;
}

/// Session store backed by Redis.
///
/// Lookups clone the underlying `ConnectionManager`, which multiplexes one
/// connection and reconnects transparently on the next use after an outage -
/// a dropped store connection therefore costs some failed authentications,
/// not a relay restart.
pub struct RedisSessionStore {
    connection: redis::aio::ConnectionManager,
    session_key_prefix: String,
    api_key_prefix: String,
}

impl RedisSessionStore {
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        info!(
            "Connecting to session store at {}",
            config.session_store_url()
        );

        let client = redis::Client::open(config.session_store_url())?;
        let connection = client.get_connection_manager().await?;

        Ok(Self {
            connection,
            session_key_prefix: config.session_key_prefix.clone(),
            api_key_prefix: config.api_key_prefix.clone(),
        })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn session_user(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        let key = format!("{}{}", self.session_key_prefix, session_id);
        let user_id: Option<String> = connection.get(key).await?;
        Ok(user_id)
    }

    async fn api_key_record(&self, api_key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let mut connection = self.connection.clone();
        let key = format!("{}{}", self.api_key_prefix, hash_api_key(api_key));
        let raw: Option<String> = connection.get(key).await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

/// In-memory session store for endpoint tests (the `mock` feature).
#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Hash-consistent with [`RedisSessionStore`]: API keys are stored under
    /// `hash_api_key` so the authentication path is exercised end to end.
    #[derive(Default)]
    pub struct MemorySessionStore {
        sessions: Mutex<HashMap<String, String>>,
        api_keys: Mutex<HashMap<String, ApiKeyRecord>>,
        unreachable: AtomicBool,
    }

    impl MemorySessionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert_session(&self, session_id: &str, user_id: &str) {
            self.sessions
                .lock()
                .unwrap()
                .insert(session_id.to_string(), user_id.to_string());
        }

        pub fn insert_api_key(&self, api_key: &str, uid: &str, status: &str) {
            self.api_keys.lock().unwrap().insert(
                hash_api_key(api_key),
                ApiKeyRecord {
                    uid: uid.to_string(),
                    status: status.to_string(),
                },
            );
        }

        /// Simulate a store outage: every lookup fails until cleared.
        pub fn set_unreachable(&self, unreachable: bool) {
            self.unreachable.store(unreachable, Ordering::SeqCst);
        }

        fn check_reachable(&self) -> Result<(), StoreError> {
            if self.unreachable.load(Ordering::SeqCst) {
                Err(StoreError::Connection("simulated outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for MemorySessionStore {
        async fn session_user(&self, session_id: &str) -> Result<Option<String>, StoreError> {
            self.check_reachable()?;
            Ok(self.sessions.lock().unwrap().get(session_id).cloned())
        }

        async fn api_key_record(&self, api_key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
            self.check_reachable()?;
            Ok(self
                .api_keys
                .lock()
                .unwrap()
                .get(&hash_api_key(api_key))
                .cloned())
        }
    }
}
