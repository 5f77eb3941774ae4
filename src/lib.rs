mod api;
mod app;
mod backend_error;
mod catalog;
mod client;
#[cfg(test)]
mod fake_transport;
mod history;
mod redact;
mod refresh;
mod settings;
mod state;
mod transport;
pub mod types;

pub use api::{ApiError, DonationApi};
pub use app::{run, Command};
pub use backend_error::{backend_message, extract_error_message};
pub use catalog::CampaignFilter;
pub use client::{AuthFetchError, AuthenticatedClient};
pub use history::{parse_timestamp, normalize, DonationHistory, DonationRecord, DonationSummary};
pub use redact::redact_tokens;
pub use refresh::{
    RefreshBodyShape, RefreshCandidate, RefreshError, RefreshState, DEFAULT_ACCESS_FIELDS,
    DEFAULT_REFRESH_FIELDS, SESSION_EXPIRED_MESSAGE,
};
pub use settings::{ClientConfig, StoreKind};
pub use state::{
    open_store, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore, StoreError, KEY_ACCESS_TOKEN, KEY_LEGACY_PROFILE, KEY_REFRESH_TOKEN,
    KEY_USER,
};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
