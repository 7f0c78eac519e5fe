use serde::Deserialize;
use sse::connection::ConnectionId;
use std::collections::HashSet;

/// Query parameters of the client stream endpoint. The `apiKey` credential
/// in the same query string is consumed by the authentication extractor,
/// not here.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamParams {
    /// Client-generated connection id, echoed back as the origin-exclusion
    /// token. Optional: the server generates one when absent.
    pub id: Option<String>,
    /// Comma-separated list of topic names to subscribe to.
    pub subs: Option<String>,
}

impl StreamParams {
    pub fn connection_id(&self) -> ConnectionId {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => ConnectionId::from(id),
            _ => ConnectionId::new(),
        }
    }

    pub fn subscriptions(&self) -> HashSet<String> {
        self.subs
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriptions_split_on_commas() {
        let params = StreamParams {
            id: Some("c1".to_string()),
            subs: Some("bois/rdvs,vrac/rdvs".to_string()),
        };

        let subs = params.subscriptions();
        assert_eq!(subs.len(), 2);
        assert!(subs.contains("bois/rdvs"));
        assert!(subs.contains("vrac/rdvs"));
    }

    #[test]
    fn test_empty_subs_yield_no_subscriptions() {
        let params = StreamParams {
            id: None,
            subs: Some(",,".to_string()),
        };
        assert!(params.subscriptions().is_empty());

        let params = StreamParams { id: None, subs: None };
        assert!(params.subscriptions().is_empty());
    }

    #[test]
    fn test_connection_id_falls_back_to_generated() {
        let supplied = StreamParams {
            id: Some("tab-uuid".to_string()),
            subs: None,
        };
        assert_eq!(supplied.connection_id().as_str(), "tab-uuid");

        let generated = StreamParams { id: None, subs: None };
        assert!(!generated.connection_id().as_str().is_empty());
    }
}
