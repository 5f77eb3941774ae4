use super::candidates::RefreshCandidate;
use crate::backend_error::backend_message;
use crate::state::{CredentialStore, StoreError, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN};
use crate::transport::{resolve_url, HttpTransport};
use crate::types::{ApiRequest, TokenPair};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

/// `Idle → Refreshing → {Refreshed, Failed}`. Only a 401 on a primary
/// request leaves `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
    Refreshed(TokenPair),
    /// Carries the backend's error text, when the last rejection had one.
    Failed(Option<String>),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("{}", .message.as_deref().unwrap_or(SESSION_EXPIRED_MESSAGE))]
    Rejected { message: Option<String> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum CandidateOutcome {
    Matched(TokenPair),
    Rejected(Option<String>),
    Unreachable,
}

/// Probes the refresh candidates in order and persists the first usable
/// token pair. When none matches, the whole session is cleared.
pub struct Refresher {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    base_url: String,
    candidates: Vec<RefreshCandidate>,
}

impl Refresher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        base_url: impl Into<String>,
        candidates: Vec<RefreshCandidate>,
    ) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.into(),
            candidates,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    async fn try_candidate(&self, candidate: &RefreshCandidate, refresh_token: &str) -> CandidateOutcome {
        let Some(url) = resolve_url(&self.base_url, &candidate.endpoint) else {
            debug!(endpoint = %candidate.endpoint, "refresh endpoint does not resolve to a url");
            return CandidateOutcome::Unreachable;
        };

        let body = match serde_json::to_vec(&candidate.body.body(refresh_token)) {
            Ok(body) => body,
            Err(_) => return CandidateOutcome::Unreachable,
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let request = ApiRequest {
            method: Method::POST,
            url,
            headers,
            body: Some(body),
        };

        let res = match self.transport.send(request).await {
            Ok(res) => res,
            Err(e) => {
                debug!(endpoint = %candidate.endpoint, error = %e, "refresh request failed");
                return CandidateOutcome::Unreachable;
            }
        };

        let json = res.json_value();
        if !res.is_success() {
            debug!(
                endpoint = %candidate.endpoint,
                shape = candidate.body.field(),
                status = res.status.as_u16(),
                "refresh candidate rejected"
            );
            return CandidateOutcome::Rejected(json.as_ref().and_then(backend_message));
        }

        match json.as_ref().and_then(|j| candidate.extract(j)) {
            Some(pair) => CandidateOutcome::Matched(pair),
            None => {
                debug!(
                    endpoint = %candidate.endpoint,
                    shape = candidate.body.field(),
                    "refresh response carried no access token"
                );
                CandidateOutcome::Rejected(None)
            }
        }
    }

    /// Runs one refresh round trip: `Refreshing` until the first candidate
    /// matches or the list is exhausted.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let mut last_message = None;

        for candidate in &self.candidates {
            match self.try_candidate(candidate, refresh_token).await {
                CandidateOutcome::Matched(pair) => {
                    // Never store a new access token beside a revoked refresh token.
                    if let Some(rotated) = &pair.refresh {
                        self.store.set(KEY_REFRESH_TOKEN, rotated).await?;
                    }
                    self.store.set(KEY_ACCESS_TOKEN, &pair.access).await?;
                    info!(
                        endpoint = %candidate.endpoint,
                        shape = candidate.body.field(),
                        rotated = pair.refresh.is_some(),
                        "access token refreshed"
                    );
                    return Ok(pair);
                }
                CandidateOutcome::Rejected(message) => {
                    if message.is_some() {
                        last_message = message;
                    }
                }
                CandidateOutcome::Unreachable => {}
            }
        }

        warn!(
            candidates = self.candidates.len(),
            "token refresh failed; clearing session"
        );
        self.store.clear().await?;
        Err(RefreshError::Rejected {
            message: last_message,
        })
    }
}
