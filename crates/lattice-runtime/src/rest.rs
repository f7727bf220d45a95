//! HTTP implementation of the manifest publish seam.
//!
//! Performs the one outbound network call the orchestration core makes: the
//! full-replace publish of the command manifest. Failures surface as errors
//! to the caller; nothing is swallowed.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::debug;

use lattice_core::BoxError;
use lattice_framework::{BotCredentials, ManifestScope, ManifestTransport};

/// Publishes command manifests against the platform's REST API.
pub struct HttpManifestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpManifestTransport {
    /// `base_url` is the API root, e.g. `https://chat.example.com/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn commands_url(&self, scope: &ManifestScope) -> String {
        match &scope.community_id {
            Some(community) => format!(
                "{}/applications/{}/communities/{}/commands",
                self.base_url, scope.application_id, community
            ),
            None => format!(
                "{}/applications/{}/commands",
                self.base_url, scope.application_id
            ),
        }
    }
}

#[async_trait]
impl ManifestTransport for HttpManifestTransport {
    async fn put_commands(
        &self,
        credentials: &BotCredentials,
        scope: &ManifestScope,
        body: &Value,
    ) -> Result<usize, BoxError> {
        let url = self.commands_url(scope);
        debug!(%url, "Publishing command manifest");

        let response = self
            .client
            .put(&url)
            .header(AUTHORIZATION, format!("Bot {}", credentials.token))
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        // The catalog echoes the full replaced set back; its length is the
        // authoritative published count.
        let returned: Value = response.json().await?;
        let published = returned
            .as_array()
            .map_or_else(|| body.as_array().map_or(0, Vec::len), Vec::len);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_and_global_urls() {
        let transport = HttpManifestTransport::new("https://chat.example.com/api");

        let global = ManifestScope {
            application_id: "app-1".into(),
            community_id: None,
        };
        assert_eq!(
            transport.commands_url(&global),
            "https://chat.example.com/api/applications/app-1/commands"
        );

        let scoped = ManifestScope {
            application_id: "app-1".into(),
            community_id: Some("guild-9".into()),
        };
        assert_eq!(
            transport.commands_url(&scoped),
            "https://chat.example.com/api/applications/app-1/communities/guild-9/commands"
        );
    }
}
