use serde::{Deserialize, Serialize};

use crate::models::AccountId;

// -- Accounts --

/// Returned by registration and by prop updates.
///
/// `auth_key` is only ever populated at registration and is `""` everywhere
/// else; the server keeps a digest of it, not the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub account_id: AccountId,
    pub connect_code: String,
    #[serde(default)]
    pub auth_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetPropsRequest {
    /// Device push token. Omitted leaves the stored token alone, an empty
    /// string removes it.
    #[serde(default)]
    pub apns_token: Option<String>,
}

// -- Pairing --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectRequest {
    pub connect_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AcceptRequest {
    pub peer_id: AccountId,

    /// Set to false to turn the request down instead.
    #[serde(default = "default_accept")]
    pub accept: bool,
}

fn default_accept() -> bool {
    true
}

// -- Health --

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
