use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::COOKIE, request::Parts, StatusCode},
};
use log::*;
use service::AppState;
use std::collections::HashMap;

/// Identity resolved for a stream request.
///
/// `session_id` is kept when the session cookie authenticated the request:
/// it is what a session-targeted forced disconnect later matches against.
/// API-key requests carry no session.
#[derive(Debug, Clone)]
pub(crate) struct StreamUser {
    pub user_id: String,
    pub session_id: Option<String>,
}

pub(crate) struct AuthenticatedUser(pub StreamUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = RejectionType;

    // Resolves the request against the external session store: a resolved
    // session cookie always wins; otherwise an active API key from the query
    // string is accepted. Anything else is rejected with 401 before any
    // registry mutation happens. Store outages are logged and degrade to an
    // authentication failure for this one request.
    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session_id) = session_cookie(parts, &state.config.session_cookie_name) {
            match state.session_store.session_user(&session_id).await {
                Ok(Some(user_id)) => {
                    return Ok(AuthenticatedUser(StreamUser {
                        user_id,
                        session_id: Some(session_id),
                    }));
                }
                Ok(None) => {
                    debug!("Session cookie did not resolve, trying API key");
                }
                Err(e) => {
                    warn!("Session lookup failed: {e}");
                }
            }
        }

        if let Some(api_key) = query_api_key(parts) {
            match state.session_store.api_key_record(&api_key).await {
                Ok(Some(record)) if record.is_active() => {
                    return Ok(AuthenticatedUser(StreamUser {
                        user_id: record.uid,
                        session_id: None,
                    }));
                }
                Ok(Some(_)) => {
                    debug!("Rejecting inactive API key");
                }
                Ok(None) => {
                    debug!("Rejecting unknown API key");
                }
                Err(e) => {
                    warn!("API key lookup failed: {e}");
                }
            }
        }

        Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
    }
}

/// Extract the named session cookie from the `Cookie` header, if present.
fn session_cookie(parts: &Parts, cookie_name: &str) -> Option<String> {
    let header = parts.headers.get(COOKIE)?.to_str().ok()?;

    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == cookie_name && !value.is_empty()).then(|| value.to_string())
    })
}

fn query_api_key(parts: &Parts) -> Option<String> {
    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri).ok()?;
    query.get("apiKey").filter(|key| !key.is_empty()).cloned()
}
