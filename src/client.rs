use crate::refresh::{RefreshCandidate, RefreshCoalescer, RefreshError, RefreshState, Refresher};
use crate::settings::ClientConfig;
use crate::state::{CredentialStore, StoreError, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN};
use crate::transport::{resolve_url, HttpTransport, TransportError};
use crate::types::{ApiRequest, ApiResponse, RequestOptions};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AuthFetchError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{message}")]
    SessionExpired { message: String },
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot resolve request url: {0}")]
    InvalidUrl(String),
}

impl AuthFetchError {
    /// HTTP status marker: `Some(401)` for the two authentication failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized | Self::SessionExpired { .. } => Some(401),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<RefreshError> for AuthFetchError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Store(e) => Self::Store(e),
            rejected => Self::SessionExpired {
                message: rejected.to_string(),
            },
        }
    }
}

fn bearer(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Caller headers plus `Authorization: Bearer <token>`. A caller-supplied
/// `Authorization` header is kept unless `force` is set.
fn with_bearer(headers: &HeaderMap, token: Option<&str>, force: bool) -> HeaderMap {
    let mut headers = headers.clone();
    if let Some(value) = token.and_then(bearer) {
        if force || !headers.contains_key(AUTHORIZATION) {
            headers.insert(AUTHORIZATION, value);
        }
    }
    headers
}

/// Backend calls with bearer attachment and a single refresh-and-retry on 401.
///
/// At most two requests reach the target URL per call: the original and,
/// after a successful refresh, one retry whose response is returned as-is.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    coalescer: Arc<RefreshCoalescer>,
    base_url: String,
}

impl AuthenticatedClient {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let candidates = RefreshCandidate::default_list(&config.refresh_endpoints);
        Self::with_candidates(config, transport, store, candidates)
    }

    pub fn with_candidates(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        candidates: Vec<RefreshCandidate>,
    ) -> Self {
        let refresher = Refresher::new(
            transport.clone(),
            store.clone(),
            config.base_url.clone(),
            candidates,
        );
        Self {
            transport,
            store,
            coalescer: Arc::new(RefreshCoalescer::new(refresher)),
            base_url: config.base_url.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub async fn refresh_state(&self) -> RefreshState {
        self.coalescer.state().await
    }

    fn resolve(&self, url: &str) -> Result<String, AuthFetchError> {
        resolve_url(&self.base_url, url).ok_or_else(|| AuthFetchError::InvalidUrl(url.to_string()))
    }

    fn build(url: &str, options: &RequestOptions, headers: HeaderMap) -> ApiRequest {
        ApiRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers,
            body: options.body.clone(),
        }
    }

    /// Sends without touching stored credentials (login, public pages).
    pub async fn send_anonymous(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, AuthFetchError> {
        let url = self.resolve(url)?;
        let request = Self::build(&url, &options, options.headers.clone());
        Ok(self.transport.send(request).await?)
    }

    /// Sends `options` to `url` with the stored bearer token.
    ///
    /// Any status other than 401 is returned unchanged. On 401 the stored
    /// refresh token is exchanged once and the request is resent once; that
    /// second response is returned whatever its status.
    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, AuthFetchError> {
        let url = self.resolve(url)?;
        let access = self.store.get(KEY_ACCESS_TOKEN).await?;

        let headers = with_bearer(&options.headers, access.as_deref(), false);
        let res = self
            .transport
            .send(Self::build(&url, &options, headers))
            .await?;
        if res.status != StatusCode::UNAUTHORIZED {
            return Ok(res);
        }

        if self.store.get(KEY_REFRESH_TOKEN).await?.is_none() {
            warn!(method = %options.method, url = %url, "401 without a refresh token");
            return Err(AuthFetchError::Unauthorized);
        }

        debug!(method = %options.method, url = %url, "401 received; refreshing access token");
        let pair = self
            .coalescer
            .refresh_after_unauthorized(access.as_deref())
            .await?;

        let headers = with_bearer(&options.headers, Some(&pair.access), true);
        let retried = self
            .transport
            .send(Self::build(&url, &options, headers))
            .await?;
        info!(
            method = %options.method,
            url = %url,
            status = retried.status.as_u16(),
            "request retried after refresh"
        );
        Ok(retried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_transport::{bearer_of, body_of, empty_response, json_response, path_of, FakeTransport};
    use crate::refresh::SESSION_EXPIRED_MESSAGE;
    use crate::types::TokenPair;
    use crate::state::{MemoryCredentialStore, KEY_LEGACY_PROFILE, KEY_USER};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const REFRESH_PATHS: [&str; 2] = ["/api/auth/refresh/", "/api/token/refresh/"];

    fn config() -> ClientConfig {
        ClientConfig {
            base_url: "http://api.test".to_string(),
            ..ClientConfig::default()
        }
    }

    fn client(transport: &Arc<FakeTransport>, store: &Arc<MemoryCredentialStore>) -> AuthenticatedClient {
        AuthenticatedClient::new(&config(), transport.clone(), store.clone())
    }

    fn refresh_calls(transport: &FakeTransport) -> usize {
        REFRESH_PATHS
            .iter()
            .map(|p| transport.requests_to(p).len())
            .sum()
    }

    #[tokio::test]
    async fn no_stored_token_sends_no_authorization() {
        let transport = Arc::new(FakeTransport::new(|_| json_response(200, json!([]))));
        let store = Arc::new(MemoryCredentialStore::new());

        let res = client(&transport, &store)
            .request("/api/campaigns/", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(bearer_of(&transport.requests()[0]), None);
    }

    #[tokio::test]
    async fn stored_token_is_attached_unless_caller_overrides() {
        let transport = Arc::new(FakeTransport::new(|_| empty_response(200)));
        let store = Arc::new(MemoryCredentialStore::with_values([(KEY_ACCESS_TOKEN, "A1")]));
        let client = client(&transport, &store);

        client.request("/api/donations/", RequestOptions::get()).await.unwrap();
        let explicit = RequestOptions::get().header(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        client.request("/api/donations/", explicit).await.unwrap();

        let sent = transport.requests();
        assert_eq!(bearer_of(&sent[0]).as_deref(), Some("Bearer A1"));
        assert_eq!(bearer_of(&sent[1]).as_deref(), Some("Token abc"));
    }

    #[tokio::test]
    async fn non_401_statuses_pass_through_without_refresh() {
        for status in [200_u16, 404, 500, 403] {
            let transport = Arc::new(FakeTransport::new(move |_| json_response(status, json!({"detail": "x"}))));
            let store = Arc::new(MemoryCredentialStore::with_values([
                (KEY_ACCESS_TOKEN, "A1"),
                (KEY_REFRESH_TOKEN, "R1"),
            ]));

            let res = client(&transport, &store)
                .request("/api/donations/", RequestOptions::get())
                .await
                .unwrap();

            assert_eq!(res.status.as_u16(), status);
            assert_eq!(transport.requests().len(), 1);
            assert_eq!(store.get(KEY_ACCESS_TOKEN).await.unwrap().as_deref(), Some("A1"));
        }
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_fails_fast() {
        let transport = Arc::new(FakeTransport::new(|_| empty_response(401)));
        let store = Arc::new(MemoryCredentialStore::with_values([(KEY_ACCESS_TOKEN, "A1")]));

        let err = client(&transport, &store)
            .request("/api/donations/", RequestOptions::get())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthFetchError::Unauthorized));
        assert_eq!(err.status(), Some(401));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(refresh_calls(&transport), 0);
    }

    #[tokio::test]
    async fn refresh_then_single_retry_returns_second_response_even_if_401() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if path_of(req) == "/api/auth/refresh/" {
                json_response(200, json!({"access": "new"}))
            } else {
                empty_response(401)
            }
        }));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "old"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));

        let client = client(&transport, &store);
        let res = client
            .request("/api/donations/", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(refresh_calls(&transport), 1);
        let targets = transport.requests_to("/api/donations/");
        assert_eq!(targets.len(), 2);
        assert_eq!(bearer_of(&targets[0]).as_deref(), Some("Bearer old"));
        assert_eq!(bearer_of(&targets[1]).as_deref(), Some("Bearer new"));
        assert_eq!(store.get(KEY_ACCESS_TOKEN).await.unwrap().as_deref(), Some("new"));
        assert_eq!(
            client.refresh_state().await,
            RefreshState::Refreshed(TokenPair {
                access: "new".to_string(),
                refresh: None,
            })
        );
    }

    #[tokio::test]
    async fn failed_refresh_clears_session_and_expires() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if REFRESH_PATHS.contains(&path_of(req)) {
                json_response(401, json!({"code": "token_not_valid"}))
            } else {
                empty_response(401)
            }
        }));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
            (KEY_USER, r#"{"name":"Ada"}"#),
            (KEY_LEGACY_PROFILE, r#"{"name":"Ada"}"#),
        ]));

        let client = client(&transport, &store);
        let err = client
            .request("/api/donations/", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(
            client.refresh_state().await,
            RefreshState::Failed(Some("code: token_not_valid".to_string()))
        );
        assert!(matches!(err, AuthFetchError::SessionExpired { .. }));
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "code: token_not_valid");
        // Two endpoints × two body shapes, and the original is never resent.
        assert_eq!(refresh_calls(&transport), 4);
        assert_eq!(transport.requests_to("/api/donations/").len(), 1);
        for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER, KEY_LEGACY_PROFILE] {
            assert_eq!(store.get(key).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn failed_refresh_without_backend_message_uses_default_text() {
        let transport = Arc::new(FakeTransport::new(|_| empty_response(401)));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));

        let err = client(&transport, &store)
            .request("/api/donations/", RequestOptions::get())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), SESSION_EXPIRED_MESSAGE);
    }

    #[tokio::test]
    async fn back_to_back_successes_never_refresh() {
        let transport = Arc::new(FakeTransport::new(|_| json_response(200, json!({"ok": true}))));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));
        let client = client(&transport, &store);

        let first = client.request("/api/campaigns/", RequestOptions::get()).await.unwrap();
        let second = client.request("/api/campaigns/", RequestOptions::get()).await.unwrap();

        assert!(first.is_success() && second.is_success());
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(refresh_calls(&transport), 0);
    }

    #[tokio::test]
    async fn donations_end_to_end_with_token_renewal() {
        let transport = Arc::new(FakeTransport::new(|req| match path_of(req) {
            "/api/auth/refresh/" if body_of(req) == json!({"refresh": "R1"}) => {
                json_response(200, json!({"access": "A2"}))
            }
            "/api/donations/" if bearer_of(req).as_deref() == Some("Bearer A2") => {
                json_response(200, json!([{"id": 1, "amount": 50}]))
            }
            _ => empty_response(401),
        }));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));

        let res = client(&transport, &store)
            .request("/api/donations/", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json_value(), Some(json!([{"id": 1, "amount": 50}])));
        assert_eq!(store.get(KEY_ACCESS_TOKEN).await.unwrap().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn retry_replays_method_and_body() {
        let transport = Arc::new(FakeTransport::new(|req| match path_of(req) {
            "/api/auth/refresh/" => json_response(200, json!({"access": "A2"})),
            _ if bearer_of(req).as_deref() == Some("Bearer A2") => json_response(201, json!({"id": 9})),
            _ => empty_response(401),
        }));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));
        let options = RequestOptions::post().json(&json!({"campaign": 3, "amount": 25})).unwrap();

        let res = client(&transport, &store).request("/api/donations/", options).await.unwrap();

        assert_eq!(res.status, StatusCode::CREATED);
        let sent = transport.requests_to("/api/donations/");
        let retried = &sent[1];
        assert_eq!(retried.method, Method::POST);
        assert_eq!(body_of(retried), json!({"campaign": 3, "amount": 25}));
    }

    #[tokio::test]
    async fn concurrent_401s_share_a_single_refresh() {
        let transport = Arc::new(
            FakeTransport::new(|req| match path_of(req) {
                "/api/auth/refresh/" => json_response(200, json!({"access": "A2"})),
                _ if bearer_of(req).as_deref() == Some("Bearer A2") => empty_response(200),
                _ => empty_response(401),
            })
            .with_delay(Duration::from_millis(25)),
        );
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));
        let client = client(&transport, &store);

        let (a, b) = tokio::join!(
            client.request("/api/donations/", RequestOptions::get()),
            client.request("/api/campaigns/", RequestOptions::get()),
        );

        assert_eq!(a.unwrap().status, StatusCode::OK);
        assert_eq!(b.unwrap().status, StatusCode::OK);
        assert_eq!(refresh_calls(&transport), 1);
        assert_eq!(transport.send_calls.load(Ordering::Relaxed), 5);
        assert!(matches!(
            client.refresh_state().await,
            RefreshState::Refreshed(pair) if pair.access == "A2"
        ));
    }

    #[tokio::test]
    async fn transport_failures_propagate_without_retry() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Err(TransportError::Network("connection refused".to_string()))
        }));
        let store = Arc::new(MemoryCredentialStore::with_values([
            (KEY_ACCESS_TOKEN, "A1"),
            (KEY_REFRESH_TOKEN, "R1"),
        ]));

        let err = client(&transport, &store)
            .request("/api/donations/", RequestOptions::get())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthFetchError::Network(_)));
        assert_eq!(err.status(), None);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn relative_url_without_base_is_rejected() {
        let transport = Arc::new(FakeTransport::new(|_| empty_response(200)));
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let config = ClientConfig {
            base_url: String::new(),
            ..ClientConfig::default()
        };
        let client = AuthenticatedClient::new(&config, transport.clone(), store);

        let err = client.request("/api/donations/", RequestOptions::get()).await.unwrap_err();
        assert!(matches!(err, AuthFetchError::InvalidUrl(_)));
        assert!(transport.requests().is_empty());
    }
}
