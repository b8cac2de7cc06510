use std::net::SocketAddr;

use anyhow::{Context, bail};

use crate::services::epub::DEFAULT_LANGUAGE;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// Runtime settings, read from `TXT2EPUB_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    /// Language tag written into generated books.
    pub language: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = var("TXT2EPUB_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid TXT2EPUB_BIND address {:?}", bind))?;

        let max_upload_mb = match var("TXT2EPUB_MAX_UPLOAD_MB") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("invalid TXT2EPUB_MAX_UPLOAD_MB value {:?}", raw))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };
        if max_upload_mb == 0 {
            bail!("TXT2EPUB_MAX_UPLOAD_MB must be greater than zero");
        }
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .context("TXT2EPUB_MAX_UPLOAD_MB is too large")?;

        let language = var("TXT2EPUB_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        Ok(Self {
            bind_addr,
            max_upload_bytes,
            language,
        })
    }
}
