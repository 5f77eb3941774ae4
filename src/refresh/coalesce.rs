use super::refresher::{RefreshError, RefreshState, Refresher};
use crate::state::{KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN};
use crate::types::TokenPair;
use tokio::sync::Mutex;
use tracing::debug;

/// Serializes refresh round trips so concurrent 401s share one outcome.
///
/// The lock guards the refresh state itself. A caller that waited behind
/// another refresh compares the stored access token with the one its failed
/// request carried: if it changed, the earlier refresh already produced a
/// usable token; if the session was cleared, the earlier refresh failed.
pub struct RefreshCoalescer {
    refresher: Refresher,
    state: Mutex<RefreshState>,
}

impl RefreshCoalescer {
    pub fn new(refresher: Refresher) -> Self {
        Self {
            refresher,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    /// Latest state. Waits for an in-flight refresh to settle.
    pub async fn state(&self) -> RefreshState {
        self.state.lock().await.clone()
    }

    /// `stale_access` is the access token the rejected request was sent with.
    pub async fn refresh_after_unauthorized(
        &self,
        stale_access: Option<&str>,
    ) -> Result<TokenPair, RefreshError> {
        let mut state = self.state.lock().await;
        let store = self.refresher.store();

        let current = store.get(KEY_ACCESS_TOKEN).await?;
        if current.as_deref() != stale_access {
            if let Some(access) = current {
                debug!("access token renewed by a concurrent refresh; reusing it");
                let refresh = store.get(KEY_REFRESH_TOKEN).await?;
                return Ok(TokenPair { access, refresh });
            }
        }

        let Some(refresh_token) = store.get(KEY_REFRESH_TOKEN).await? else {
            let message = match &*state {
                RefreshState::Failed(message) => message.clone(),
                _ => None,
            };
            debug!("session cleared while waiting for refresh");
            return Err(RefreshError::Rejected { message });
        };

        *state = RefreshState::Refreshing;
        let result = self.refresher.refresh(&refresh_token).await;
        *state = match &result {
            Ok(pair) => RefreshState::Refreshed(pair.clone()),
            Err(RefreshError::Rejected { message }) => RefreshState::Failed(message.clone()),
            Err(RefreshError::Store(_)) => RefreshState::Idle,
        };
        result
    }
}
