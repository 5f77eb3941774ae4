use crate::backend_error::extract_error_message;
use crate::catalog::CampaignFilter;
use crate::client::{AuthFetchError, AuthenticatedClient};
use crate::history::DonationHistory;
use crate::settings::ClientConfig;
use crate::state::{
    CredentialStore, StoreError, KEY_ACCESS_TOKEN, KEY_LEGACY_PROFILE, KEY_REFRESH_TOKEN, KEY_USER,
};
use crate::types::{ApiResponse, DonationPayload, LoginRequest, ProfileSnapshot, RequestOptions, UserType};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] AuthFetchError),
    #[error("{message}")]
    Backend { status: u16, message: String },
    #[error("Please fill in all fields")]
    MissingCredentials,
    #[error("Please enter a valid donation amount")]
    InvalidAmount,
    #[error("Please log in first to donate")]
    NotLoggedIn,
    #[error("Session expired. Please log in again.")]
    SessionExpired,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Whether the caller should send the user back to the login view.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_auth_failure(),
            Self::NotLoggedIn | Self::SessionExpired => true,
            _ => false,
        }
    }
}

fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn read_token(data: &Value, field: &str) -> Option<String> {
    let s = data.get("tokens")?.get(field)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Accepts a bare array or a paginated `{"results": [...]}`; anything else is empty.
fn pick_list(data: Option<Value>) -> Vec<Value> {
    match data {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut map)) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => vec![],
        },
        _ => vec![],
    }
}

fn backend_error(res: &ApiResponse, fallback: &str) -> ApiError {
    ApiError::Backend {
        status: res.status.as_u16(),
        message: extract_error_message(res.json_value().as_ref(), fallback),
    }
}

/// Typed calls for the donation backend, all routed through the
/// authenticated client except login and campaign detail.
#[derive(Clone)]
pub struct DonationApi {
    client: AuthenticatedClient,
    login_path: String,
    campaigns_path: String,
    donations_path: String,
}

impl DonationApi {
    pub fn new(config: &ClientConfig, client: AuthenticatedClient) -> Self {
        Self {
            client,
            login_path: config.login_path.clone(),
            campaigns_path: config.campaigns_path.clone(),
            donations_path: config.donations_path.clone(),
        }
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    fn store(&self) -> &dyn CredentialStore {
        self.client.store().as_ref()
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        user_type: UserType,
    ) -> Result<ProfileSnapshot, ApiError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::MissingCredentials);
        }

        let options = RequestOptions::post().json(&LoginRequest {
            email,
            password,
            user_type,
        })?;
        let res = self.client.send_anonymous(&self.login_path, options).await?;
        if !res.is_success() {
            warn!(status = res.status.as_u16(), "login rejected");
            return Err(backend_error(&res, "Login failed"));
        }

        let data = res.json_value().unwrap_or(Value::Null);
        let store = self.store();
        if let Some(access) = read_token(&data, "access") {
            store.set(KEY_ACCESS_TOKEN, &access).await?;
        }
        if let Some(refresh) = read_token(&data, "refresh") {
            store.set(KEY_REFRESH_TOKEN, &refresh).await?;
        }

        let user = data.get("user").filter(|u| u.is_object());
        if let Some(user) = user {
            store.set(KEY_USER, &user.to_string()).await?;
        }

        let profile = ProfileSnapshot::from_login(user, email, user_type, now_iso());
        store
            .set(KEY_LEGACY_PROFILE, &serde_json::to_string(&profile)?)
            .await?;

        info!(role = user_type.as_str(), "logged in");
        Ok(profile)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.store().clear().await?;
        info!("logged out");
        Ok(())
    }

    /// True when an access token is stored. Gate for protected views.
    pub async fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self.store().get(KEY_ACCESS_TOKEN).await?.is_some())
    }

    /// Cached display profile. A corrupt snapshot reads as absent.
    pub async fn profile(&self) -> Result<Option<ProfileSnapshot>, ApiError> {
        let Some(raw) = self.store().get(KEY_LEGACY_PROFILE).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Value>, ApiError> {
        let res = self
            .client
            .request(&self.campaigns_path, RequestOptions::get())
            .await?;
        if !res.is_success() {
            let fallback = format!("HTTP {}", res.status.as_u16());
            return Err(backend_error(&res, &fallback));
        }
        Ok(pick_list(res.json_value()))
    }

    pub async fn search_campaigns(&self, filter: &CampaignFilter) -> Result<Vec<Value>, ApiError> {
        Ok(filter.apply(self.list_campaigns().await?))
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Value, ApiError> {
        let path = format!(
            "{}/{}/",
            self.campaigns_path.trim_end_matches('/'),
            urlencoding::encode(campaign_id.trim())
        );
        let res = self.client.send_anonymous(&path, RequestOptions::get()).await?;
        if !res.is_success() {
            return Err(backend_error(&res, "Campaign not found"));
        }
        Ok(res.json_value().unwrap_or(Value::Null))
    }

    pub async fn list_donations(&self) -> Result<Vec<Value>, ApiError> {
        let res = self
            .client
            .request(&self.donations_path, RequestOptions::get())
            .await?;
        if !res.is_success() {
            let fallback = format!("Failed to load donations (HTTP {})", res.status.as_u16());
            return Err(backend_error(&res, &fallback));
        }
        Ok(pick_list(res.json_value()))
    }

    /// Normalized history, newest first, narrowed to `status` (`"all"` or
    /// `None` keeps everything). Totals always cover the full history.
    pub async fn donation_history(&self, status: Option<&str>) -> Result<DonationHistory, ApiError> {
        let items = self.list_donations().await?;
        Ok(DonationHistory::build(&items, status, OffsetDateTime::now_utc()))
    }

    pub async fn create_donation(&self, payload: &DonationPayload) -> Result<Value, ApiError> {
        if !(payload.amount >= 1.0) {
            return Err(ApiError::InvalidAmount);
        }
        if self.store().get(KEY_ACCESS_TOKEN).await?.is_none() {
            return Err(ApiError::NotLoggedIn);
        }

        let options = RequestOptions::post().json(payload)?;
        let res = self.client.request(&self.donations_path, options).await?;

        if res.status.as_u16() == 401 {
            // Still rejected after the refresh-and-retry.
            self.store().clear().await?;
            warn!("donation rejected after token refresh; session cleared");
            return Err(ApiError::SessionExpired);
        }
        if !res.is_success() {
            let fallback = format!("HTTP {}", res.status.as_u16());
            return Err(backend_error(&res, &fallback));
        }

        info!(campaign = payload.campaign, "donation created");
        Ok(res.json_value().unwrap_or(Value::Null))
    }
}
