//! Push nudges telling a device it has something to fetch.
//!
//! Delivery is best effort. A notifier never reports failure to its caller;
//! whatever goes wrong is logged and dropped.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use beam_db::Database;
use beam_types::models::AccountId;

const APNS_PRODUCTION_HOST: &str = "https://api.push.apple.com";
const APNS_SANDBOX_HOST: &str = "https://api.sandbox.push.apple.com";

/// APNs rejects provider tokens older than an hour and throttles ones
/// refreshed more often than every 20 minutes.
const PROVIDER_TOKEN_TTL_SECS: i64 = 50 * 60;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell `account` it has new data waiting.
    async fn notify(&self, account: AccountId);
}

/// Used when push is not configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, account: AccountId) {
        debug!("Push disabled, not notifying account {}", account);
    }
}

#[derive(Debug, Clone)]
pub struct ApnsConfig {
    /// `.p8` signing key from the Apple developer account.
    pub key_path: PathBuf,
    pub key_id: String,
    pub team_id: String,
    /// App bundle id.
    pub topic: String,
    pub production: bool,
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

struct CachedToken {
    token: String,
    issued_at: i64,
}

/// Sends background (content-available) pushes through APNs over HTTP/2.
pub struct ApnsNotifier {
    db: Arc<Database>,
    client: reqwest::Client,
    config: ApnsConfig,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl ApnsNotifier {
    pub fn new(db: Arc<Database>, config: ApnsConfig) -> anyhow::Result<Self> {
        let pem = std::fs::read(&config.key_path)?;
        let signing_key = EncodingKey::from_ec_pem(&pem)?;
        let client = reqwest::Client::builder().build()?;

        info!(
            "APNs push enabled for topic {} ({})",
            config.topic,
            if config.production { "production" } else { "sandbox" }
        );
        Ok(Self {
            db,
            client,
            config,
            signing_key,
            token: Mutex::new(None),
        })
    }

    fn host(&self) -> &'static str {
        if self.config.production {
            APNS_PRODUCTION_HOST
        } else {
            APNS_SANDBOX_HOST
        }
    }

    /// Signed provider token, reused until it is close to expiry.
    fn provider_token(&self) -> anyhow::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let mut cached = self
            .token
            .lock()
            .map_err(|e| anyhow::anyhow!("APNs token lock poisoned: {}", e))?;

        if let Some(t) = cached.as_ref() {
            if now - t.issued_at < PROVIDER_TOKEN_TTL_SECS {
                return Ok(t.token.clone());
            }
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.config.key_id.clone());
        let claims = ProviderClaims {
            iss: &self.config.team_id,
            iat: now,
        };
        let token = encode(&header, &claims, &self.signing_key)?;

        *cached = Some(CachedToken {
            token: token.clone(),
            issued_at: now,
        });
        Ok(token)
    }

    async fn push_token(&self, account: AccountId) -> anyhow::Result<Option<String>> {
        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || db.account_by_id(account)).await??;
        Ok(row.push_token)
    }

    async fn forget_token(&self, account: AccountId) {
        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || db.set_push_token(account, None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to drop stale push token for {}: {}", account, e),
            Err(e) => warn!("Push token cleanup for {} did not run: {}", account, e),
        }
    }

    async fn send(&self, account: AccountId) -> anyhow::Result<()> {
        let Some(device_token) = self.push_token(account).await? else {
            debug!("Account {} has no push token", account);
            return Ok(());
        };

        let url = format!("{}/3/device/{}", self.host(), device_token);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.provider_token()?)
            .header("apns-topic", &self.config.topic)
            .header("apns-push-type", "background")
            .header("apns-priority", "5")
            .json(&json!({ "aps": { "content-available": 1 } }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Pushed to account {}", account);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::GONE {
            info!("Push token for account {} is no longer valid", account);
            self.forget_token(account).await;
            return Ok(());
        }
        anyhow::bail!("APNs answered {}: {}", status, body)
    }
}

#[async_trait]
impl Notifier for ApnsNotifier {
    async fn notify(&self, account: AccountId) {
        if let Err(e) = self.send(account).await {
            warn!("Push to account {} failed: {}", account, e);
        }
    }
}
