use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

use beam_api::DEFAULT_MAX_UPLOAD_BYTES;
use beam_api::notify::ApnsConfig;

const DEFAULT_APNS_TOPIC: &str = "com.elsdoerfer.photobeam";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub max_upload_bytes: usize,
    /// `None` unless the key path, key id and team id are all set.
    pub apns: Option<ApnsConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = var("PHOTOBEAM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("PHOTOBEAM_PORT")
            .unwrap_or_else(|| "10000".into())
            .parse()
            .context("PHOTOBEAM_PORT")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("PHOTOBEAM_HOST")?;

        let db_path: PathBuf = var("PHOTOBEAM_DB_PATH")
            .unwrap_or_else(|| "photobeam.db".into())
            .into();

        let max_upload_bytes = match var("PHOTOBEAM_MAX_UPLOAD_BYTES") {
            Some(v) => v.parse().context("PHOTOBEAM_MAX_UPLOAD_BYTES")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let apns = match (
            var("PHOTOBEAM_APNS_KEY_PATH"),
            var("PHOTOBEAM_APNS_KEY_ID"),
            var("PHOTOBEAM_APNS_TEAM_ID"),
        ) {
            (Some(key_path), Some(key_id), Some(team_id)) => Some(ApnsConfig {
                key_path: key_path.into(),
                key_id,
                team_id,
                topic: var("PHOTOBEAM_APNS_TOPIC").unwrap_or_else(|| DEFAULT_APNS_TOPIC.into()),
                production: var("PHOTOBEAM_APNS_PRODUCTION")
                    .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            }),
            _ => None,
        };

        Ok(Self {
            addr,
            db_path,
            max_upload_bytes,
            apns,
        })
    }
}
