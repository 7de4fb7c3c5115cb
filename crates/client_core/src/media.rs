use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn download(&self, source_url: &str, destination: &Path) -> Result<()>;
}

/// Downloads message attachments to the local media root over HTTP.
pub struct HttpMediaFetcher {
    http: Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for HttpMediaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn download(&self, source_url: &str, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create media dir '{}'", parent.display()))?;
        }

        let bytes = self
            .http
            .get(source_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("attachment download failed: {source_url}"))?
            .bytes()
            .await
            .context("failed to read attachment body")?;

        tokio::fs::write(destination, &bytes)
            .await
            .with_context(|| format!("failed to write attachment '{}'", destination.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/media_tests.rs"]
mod tests;
