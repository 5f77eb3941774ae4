use crate::types::TokenPair;
use serde_json::{Map, Value};

pub const DEFAULT_ACCESS_FIELDS: [&str; 2] = ["access", "tokens.access"];
pub const DEFAULT_REFRESH_FIELDS: [&str; 2] = ["refresh", "tokens.refresh"];

/// Request body layout for a refresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBodyShape {
    /// `{"refresh": "<token>"}`
    Refresh,
    /// `{"refresh_token": "<token>"}`
    RefreshToken,
}

impl RefreshBodyShape {
    pub const ALL: [RefreshBodyShape; 2] = [Self::Refresh, Self::RefreshToken];

    pub fn field(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::RefreshToken => "refresh_token",
        }
    }

    pub fn body(&self, refresh_token: &str) -> Value {
        let mut body = Map::new();
        body.insert(self.field().to_string(), Value::String(refresh_token.to_string()));
        Value::Object(body)
    }
}

/// One (endpoint, body shape, response fields) combination tried during
/// token renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCandidate {
    pub endpoint: String,
    pub body: RefreshBodyShape,
    /// Dotted paths searched in order for the new access token.
    pub access_fields: Vec<String>,
    /// Dotted paths searched in order for a rotated refresh token.
    pub refresh_fields: Vec<String>,
}

fn lookup_str<'a>(json: &'a Value, path: &str) -> Option<&'a str> {
    let mut current = json;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.as_object()?.get(segment)?;
    }
    let s = current.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn first_match(json: &Value, paths: &[String]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup_str(json, path))
        .map(str::to_string)
}

impl RefreshCandidate {
    pub fn new(endpoint: impl Into<String>, body: RefreshBodyShape) -> Self {
        Self {
            endpoint: endpoint.into(),
            body,
            access_fields: DEFAULT_ACCESS_FIELDS.iter().map(|s| s.to_string()).collect(),
            refresh_fields: DEFAULT_REFRESH_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Every endpoint with every body shape, endpoint-major, in the given order.
    pub fn default_list<S: AsRef<str>>(endpoints: &[S]) -> Vec<Self> {
        endpoints
            .iter()
            .flat_map(|endpoint| {
                RefreshBodyShape::ALL
                    .into_iter()
                    .map(move |shape| Self::new(endpoint.as_ref(), shape))
            })
            .collect()
    }

    /// The new tokens, if the response body carries an access token where
    /// this candidate expects one.
    pub fn extract(&self, json: &Value) -> Option<TokenPair> {
        let access = first_match(json, &self.access_fields)?;
        let refresh = first_match(json, &self.refresh_fields);
        Some(TokenPair { access, refresh })
    }
}
