use crate::connection::{ConnectionId, ConnectionInfo, ConnectionRegistry};
use crate::message::Frame;
use events::{DisconnectTarget, Notification, TOPIC_ADMIN_USERS, TYPE_CLOSE};
use log::*;
use std::sync::Arc;

/// High-level routing over the connection registry.
///
/// One `Manager` is shared by both HTTP surfaces: the stream endpoint
/// registers connections, the ingest endpoint routes notifications.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

/// Deregisters its connection when dropped.
///
/// The stream generator owns the guard, so teardown runs exactly once no
/// matter which edge closed the connection: client disconnect drops the
/// generator, a forced disconnect ends the channel and the generator
/// completes, a write failure drops the response. Deregistration is
/// idempotent, so racing a forced disconnect is harmless.
#[must_use]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!("SSE connection {} closing, deregistering", self.connection_id);
        self.registry.unregister(&self.connection_id);
    }
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Register a new connection. The returned guard deregisters it on drop.
    pub fn register_connection(
        &self,
        connection_id: ConnectionId,
        info: ConnectionInfo,
    ) -> ConnectionGuard {
        info!(
            "Registered SSE connection {} for user {} ({} subscription(s))",
            connection_id,
            info.user_id,
            info.subscriptions.len()
        );
        self.registry.register(connection_id.clone(), info);

        ConnectionGuard {
            registry: self.registry.clone(),
            connection_id,
        }
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Route one decoded notification to matching connections.
    ///
    /// `origin` is taken out of the message before any forwarding. Reserved
    /// `close` messages terminate connections instead of fanning out; every
    /// other message goes to its topic's subscribers, with `admin/users`
    /// changes additionally redirected to the affected user.
    pub fn route(&self, mut notification: Notification) {
        let origin = notification.origin.take();

        if notification.is_forced_disconnect() {
            self.force_disconnect(&notification);
            return;
        }
        if notification.kind == TYPE_CLOSE {
            // Reserved type on a topic that defines no disconnect targets.
            debug!(
                "Dropping reserved close notification on topic {}",
                notification.name
            );
            return;
        }

        let frame = match Frame::db(&notification) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize notification for fan-out: {e}");
                return;
            }
        };

        let delivered = self
            .registry
            .send_to_topic(&notification.name, origin.as_deref(), frame);
        debug!(
            "Fanned out {} {} to {} connection(s)",
            notification.name, notification.kind, delivered
        );

        if notification.name == TOPIC_ADMIN_USERS {
            self.redirect_to_user(&notification);
        }
    }

    /// Push a narrowed `user` event to the connections of the user whose
    /// record changed, whatever their subscriptions. Unconditional: the
    /// affected user always learns about their own account change, even if
    /// one of their tabs originated it.
    fn redirect_to_user(&self, notification: &Notification) {
        let derived = notification.profile_for_user();
        let target_user = notification.id.to_string();

        let frame = match Frame::db(&derived) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize user profile event: {e}");
                return;
            }
        };

        let delivered = self.registry.send_to_user(&target_user, frame);
        debug!(
            "Redirected {} change to {} connection(s) of user {}",
            notification.name, delivered, target_user
        );
    }

    fn force_disconnect(&self, notification: &Notification) {
        let raw_target = notification.id.to_string();

        match DisconnectTarget::parse(&raw_target) {
            Some(DisconnectTarget::User(user_id)) => {
                let closed = self.registry.close_user(&user_id);
                info!("Forced disconnect of user {user_id}: closed {closed} connection(s)");
            }
            Some(DisconnectTarget::Session(session_id)) => {
                let closed = self.registry.close_session(&session_id);
                info!("Forced disconnect of session {session_id}: closed={closed}");
            }
            None => {
                warn!("Ignoring forced disconnect with unknown target encoding: {raw_target}");
            }
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EVENT_DB;
    use serde_json::json;
    use std::collections::HashSet;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn notification(value: serde_json::Value) -> Notification {
        serde_json::from_value(value).unwrap()
    }

    fn connect(
        manager: &Manager,
        id: &str,
        user_id: &str,
        session_id: Option<&str>,
        subs: &[&str],
    ) -> (ConnectionGuard, UnboundedReceiver<Frame>) {
        let (tx, rx) = unbounded_channel();
        let guard = manager.register_connection(
            ConnectionId::from(id),
            ConnectionInfo {
                user_id: user_id.to_string(),
                session_id: session_id.map(str::to_string),
                subscriptions: subs.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
                sender: tx,
            },
        );
        (guard, rx)
    }

    fn data_of(frame: &Frame) -> serde_json::Value {
        serde_json::from_str(frame.data.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn test_route_fans_out_by_topic_without_origin() {
        let manager = Manager::new();
        let (_g1, mut bois) = connect(&manager, "a", "u1", None, &["bois/rdvs"]);
        let (_g2, mut vrac) = connect(&manager, "b", "u2", None, &["vrac/rdvs"]);

        manager.route(notification(json!({
            "name": "bois/rdvs", "type": "update", "id": 7, "origin": "zz"
        })));

        let frame = bois.try_recv().expect("subscriber receives the event");
        assert_eq!(frame.event, EVENT_DB);
        assert_eq!(
            data_of(&frame),
            json!({"name": "bois/rdvs", "type": "update", "id": 7})
        );
        assert!(vrac.try_recv().is_err());
    }

    #[test]
    fn test_route_excludes_the_origin_connection() {
        let manager = Manager::new();
        let (_g1, mut origin) = connect(&manager, "a", "u1", None, &["bois/rdvs"]);
        let (_g2, mut other) = connect(&manager, "b", "u2", None, &["bois/rdvs"]);

        manager.route(notification(json!({
            "name": "bois/rdvs", "type": "patch", "id": "r7", "origin": "a"
        })));

        assert!(origin.try_recv().is_err());
        assert!(other.try_recv().is_ok());
    }

    #[test]
    fn test_admin_users_change_is_redirected_to_the_affected_user() {
        let manager = Manager::new();
        let (_g1, mut admin) = connect(&manager, "a", "u1", None, &["admin/users"]);
        let (_g2, mut affected) = connect(&manager, "b", "u42", None, &["bois/rdvs"]);

        manager.route(notification(json!({
            "name": "admin/users",
            "type": "update",
            "id": "u42",
            "data": {"login": "x", "nom": "X", "roles": {}, "statut": "active", "password": "secret"}
        })));

        // The admin subscribed to the topic sees the full event.
        let admin_frame = admin.try_recv().expect("admin receives the topic event");
        assert_eq!(data_of(&admin_frame)["data"]["password"], json!("secret"));

        // The affected user gets the narrowed `user` event despite not
        // subscribing to it.
        let user_frame = affected.try_recv().expect("affected user receives the push");
        let payload = data_of(&user_frame);
        assert_eq!(payload["name"], json!("user"));
        assert_eq!(payload["data"]["uid"], json!("u42"));
        assert!(payload["data"].get("password").is_none());
    }

    #[test]
    fn test_user_redirection_reaches_the_origin_tab_too() {
        let manager = Manager::new();
        let (_g, mut own_tab) = connect(&manager, "a", "u42", None, &["admin/users"]);

        manager.route(notification(json!({
            "name": "admin/users", "type": "update", "id": "u42",
            "data": {"login": "x"}, "origin": "a"
        })));

        // Origin exclusion applies to the topic fan-out...
        let frame = own_tab.try_recv().expect("redirected push arrives");
        // ...but the targeted push is unconditional.
        assert_eq!(data_of(&frame)["name"], json!("user"));
        assert!(own_tab.try_recv().is_err(), "only the targeted push arrives");
    }

    #[test]
    fn test_forced_disconnect_by_user_closes_all_their_connections() {
        let manager = Manager::new();
        let (_g1, mut tab1) = connect(&manager, "a", "u42", Some("s1"), &["bois/rdvs"]);
        let (_g2, mut tab2) = connect(&manager, "b", "u42", Some("s2"), &["vrac/rdvs"]);
        let (_g3, mut other) = connect(&manager, "c", "u7", Some("s3"), &["bois/rdvs"]);

        manager.route(notification(json!({
            "name": "admin/sessions", "type": "close", "id": "uid:u42"
        })));

        assert_eq!(manager.connection_count(), 1);
        // Dropped senders end the streams; no frame was fanned out.
        assert!(tab1.try_recv().is_err());
        assert!(tab2.try_recv().is_err());
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_forced_disconnect_by_session_closes_only_that_session() {
        let manager = Manager::new();
        let (_g1, _tab1) = connect(&manager, "a", "u42", Some("abc123"), &["bois/rdvs"]);
        let (_g2, _tab2) = connect(&manager, "b", "u42", Some("def456"), &["bois/rdvs"]);

        manager.route(notification(json!({
            "name": "admin/sessions", "type": "close", "id": "sid:abc123"
        })));
        assert_eq!(manager.connection_count(), 1);

        // No match: no effect.
        manager.route(notification(json!({
            "name": "admin/sessions", "type": "close", "id": "sid:missing"
        })));
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn test_forced_disconnect_with_unknown_target_is_ignored() {
        let manager = Manager::new();
        let (_g, _rx) = connect(&manager, "a", "u42", Some("s1"), &["bois/rdvs"]);

        manager.route(notification(json!({
            "name": "admin/sessions", "type": "close", "id": "u42"
        })));

        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn test_reserved_close_type_never_fans_out() {
        let manager = Manager::new();
        let (_g, mut rx) = connect(&manager, "a", "u1", None, &["bois/rdvs"]);

        manager.route(notification(json!({
            "name": "bois/rdvs", "type": "close", "id": 7
        })));

        assert!(rx.try_recv().is_err());
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn test_guard_drop_deregisters_exactly_once() {
        let manager = Manager::new();
        let (guard, _rx) = connect(&manager, "a", "u1", None, &["bois/rdvs"]);
        assert_eq!(manager.connection_count(), 1);

        drop(guard);
        assert_eq!(manager.connection_count(), 0);

        // A forced disconnect that already removed the connection makes the
        // later guard drop a no-op.
        let (guard2, _rx2) = connect(&manager, "b", "u2", Some("s9"), &["bois/rdvs"]);
        manager.route(notification(json!({
            "name": "admin/sessions", "type": "close", "id": "sid:s9"
        })));
        assert_eq!(manager.connection_count(), 0);
        drop(guard2);
        assert_eq!(manager.connection_count(), 0);
    }
}
