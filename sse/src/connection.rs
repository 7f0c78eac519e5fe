use crate::message::Frame;
use dashmap::DashMap;
use log::*;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Type alias for user ids as resolved by the session store.
pub type UserId = String;

/// Unique identifier for a connection.
///
/// Generated by the client at connect time and trusted as an echo token for
/// origin exclusion; the server generates one only when the client omits it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection state held by the registry (no redundant connection_id).
///
/// The `sender` is the registry's only handle on the connection's response
/// stream: dropping it ends the stream and closes the client's transport,
/// which is how forced disconnects terminate a connection.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub user_id: UserId,
    pub session_id: Option<String>,
    pub subscriptions: HashSet<String>,
    pub sender: UnboundedSender<Frame>,
}

/// Connection registry with dual indices: primary storage by connection id
/// plus a user index for O(1) user-targeted routing.
///
/// At any instant the registry holds exactly the open, authenticated
/// connections. Insertion is atomic and visible-or-not; removal is
/// idempotent, so a forced disconnect racing the connection's own teardown
/// is a no-op for whichever side loses.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: fast lookup by user_id for targeted routing - O(1)
    user_index: DashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Register a connection - O(1). A client reconnecting with the same id
    /// replaces the stale entry, closing its stream and fixing the user
    /// index, so no id ever appears twice.
    pub fn register(&self, connection_id: ConnectionId, info: ConnectionInfo) {
        let user_id = info.user_id.clone();

        if let Some(previous) = self.connections.insert(connection_id.clone(), info) {
            self.remove_from_user_index(&previous.user_id, &connection_id);
        }

        self.user_index
            .entry(user_id)
            .or_default()
            .insert(connection_id);
    }

    /// Unregister a connection - O(1), idempotent.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        if let Some((_, info)) = self.connections.remove(connection_id) {
            self.remove_from_user_index(&info.user_id, connection_id);
        }
    }

    fn remove_from_user_index(&self, user_id: &str, connection_id: &ConnectionId) {
        if let Some(mut entry) = self.user_index.get_mut(user_id) {
            entry.remove(connection_id);
            let now_empty = entry.is_empty();
            drop(entry); // release the shard lock before removal

            if now_empty {
                self.user_index.remove_if(user_id, |_, ids| ids.is_empty());
            }
        }
    }

    /// Deliver a frame to every connection subscribed to `topic`, except the
    /// excluded origin connection. O(n) scan over open connections, which is
    /// fine at the expected scale of hundreds to low thousands.
    pub fn send_to_topic(&self, topic: &str, exclude: Option<&str>, frame: Frame) -> usize {
        let mut delivered = 0;

        for entry in self.connections.iter() {
            if exclude == Some(entry.key().as_str()) {
                continue;
            }
            if !entry.value().subscriptions.contains(topic) {
                continue;
            }
            if let Err(e) = entry.value().sender.send(frame.clone()) {
                warn!(
                    "Failed to send event to connection {}: {}. Connection will be cleaned up.",
                    entry.key(),
                    e
                );
            } else {
                delivered += 1;
            }
        }

        delivered
    }

    /// Deliver a frame to every connection of `user_id`, regardless of its
    /// declared subscriptions - O(1) lookup + O(k) sends.
    pub fn send_to_user(&self, user_id: &str, frame: Frame) -> usize {
        let mut delivered = 0;

        if let Some(connection_ids) = self.user_index.get(user_id) {
            for connection_id in connection_ids.iter() {
                if let Some(info) = self.connections.get(connection_id) {
                    if let Err(e) = info.sender.send(frame.clone()) {
                        warn!(
                            "Failed to send event to connection {}: {}. Connection will be cleaned up.",
                            connection_id, e
                        );
                    } else {
                        delivered += 1;
                    }
                }
            }
        }

        delivered
    }

    /// Terminate every connection belonging to `user_id`. Removal drops each
    /// connection's sender, which ends its stream and closes the transport.
    pub fn close_user(&self, user_id: &str) -> usize {
        // Collect ids first: unregister touches the same user_index shard.
        let connection_ids: Vec<ConnectionId> = match self.user_index.get(user_id) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return 0,
        };

        for connection_id in &connection_ids {
            self.unregister(connection_id);
        }

        connection_ids.len()
    }

    /// Terminate the single connection authenticated by `session_id`, if any.
    pub fn close_session(&self, session_id: &str) -> bool {
        let found = self.connections.iter().find_map(|entry| {
            (entry.value().session_id.as_deref() == Some(session_id))
                .then(|| entry.key().clone())
        });

        match found {
            Some(connection_id) => {
                self.unregister(&connection_id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Frame;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn open_connection(
        registry: &ConnectionRegistry,
        id: &str,
        user_id: &str,
        session_id: Option<&str>,
        subs: &[&str],
    ) -> UnboundedReceiver<Frame> {
        let (tx, rx) = unbounded_channel();
        registry.register(
            ConnectionId::from(id),
            ConnectionInfo {
                user_id: user_id.to_string(),
                session_id: session_id.map(str::to_string),
                subscriptions: subs.iter().map(|s| s.to_string()).collect(),
                sender: tx,
            },
        );
        rx
    }

    fn test_frame() -> Frame {
        Frame {
            event: "db".to_string(),
            data: Some("{}".to_string()),
            retry_ms: None,
        }
    }

    #[test]
    fn test_topic_fanout_only_reaches_subscribers() {
        let registry = ConnectionRegistry::new();
        let mut bois = open_connection(&registry, "a", "u1", None, &["bois/rdvs"]);
        let mut vrac = open_connection(&registry, "b", "u2", None, &["vrac/rdvs"]);

        let delivered = registry.send_to_topic("bois/rdvs", None, test_frame());

        assert_eq!(delivered, 1);
        assert!(bois.try_recv().is_ok());
        assert!(vrac.try_recv().is_err());
    }

    #[test]
    fn test_origin_connection_is_excluded_from_fanout() {
        let registry = ConnectionRegistry::new();
        let mut origin = open_connection(&registry, "a", "u1", None, &["bois/rdvs"]);
        let mut other = open_connection(&registry, "b", "u2", None, &["bois/rdvs"]);

        let delivered = registry.send_to_topic("bois/rdvs", Some("a"), test_frame());

        assert_eq!(delivered, 1);
        assert!(origin.try_recv().is_err());
        assert!(other.try_recv().is_ok());
    }

    #[test]
    fn test_send_to_user_ignores_subscriptions() {
        let registry = ConnectionRegistry::new();
        let mut target = open_connection(&registry, "a", "u42", None, &["bois/rdvs"]);
        let mut bystander = open_connection(&registry, "b", "u7", None, &["user"]);

        let delivered = registry.send_to_user("u42", test_frame());

        assert_eq!(delivered, 1);
        assert!(target.try_recv().is_ok());
        assert!(bystander.try_recv().is_err());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let _rx = open_connection(&registry, "a", "u1", None, &["bois/rdvs"]);
        let _other = open_connection(&registry, "b", "u2", None, &["bois/rdvs"]);

        let id = ConnectionId::from("a");
        registry.unregister(&id);
        registry.unregister(&id);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.send_to_topic("bois/rdvs", None, test_frame()), 1);
    }

    #[test]
    fn test_reregistering_an_id_replaces_the_stale_entry() {
        let registry = ConnectionRegistry::new();
        let mut first = open_connection(&registry, "a", "u1", None, &["bois/rdvs"]);
        let mut second = open_connection(&registry, "a", "u1", None, &["bois/rdvs"]);

        assert_eq!(registry.len(), 1);
        // The stale entry's sender was dropped with it, ending its stream.
        assert!(first.try_recv().is_err());

        let delivered = registry.send_to_topic("bois/rdvs", None, test_frame());
        assert_eq!(delivered, 1);
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn test_close_user_terminates_every_connection_of_that_user() {
        let registry = ConnectionRegistry::new();
        let _tab1 = open_connection(&registry, "a", "u42", Some("s1"), &["bois/rdvs"]);
        let _tab2 = open_connection(&registry, "b", "u42", Some("s2"), &["vrac/rdvs"]);
        let _other = open_connection(&registry, "c", "u7", Some("s3"), &["bois/rdvs"]);

        let closed = registry.close_user("u42");

        assert_eq!(closed, 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&ConnectionId::from("c")));
        assert_eq!(registry.send_to_user("u42", test_frame()), 0);
    }

    #[test]
    fn test_close_session_terminates_only_the_matching_connection() {
        let registry = ConnectionRegistry::new();
        let _tab1 = open_connection(&registry, "a", "u42", Some("abc123"), &["bois/rdvs"]);
        let _tab2 = open_connection(&registry, "b", "u42", Some("def456"), &["bois/rdvs"]);

        assert!(registry.close_session("abc123"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&ConnectionId::from("b")));

        assert!(!registry.close_session("missing"));
        assert_eq!(registry.len(), 1);
    }
}
