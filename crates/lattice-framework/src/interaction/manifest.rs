//! Declarative command manifest and its publish path.
//!
//! Slash-style and context-menu registrations carry a
//! [`CommandManifestEntry`]; the router serializes the full set and
//! [`InteractionRouter::deploy_manifest`] pushes it to the platform's remote
//! command catalog with full-replace semantics — publishing the same set
//! twice yields the same count and no duplicate remote entries.
//!
//! The outbound I/O lives behind [`ManifestTransport`] so the framework
//! stays off the network; `lattice-runtime` provides the HTTP
//! implementation, tests use an in-memory recorder.
//!
//! [`InteractionRouter::deploy_manifest`]: super::InteractionRouter::deploy_manifest

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use lattice_core::BoxError;

/// Kind discriminator in the platform's manifest shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// Slash-style chat command.
    ChatInput,
    /// Context-menu command on a user.
    User,
    /// Context-menu command on a message.
    Message,
}

impl ManifestKind {
    fn discriminant(self) -> u8 {
        match self {
            Self::ChatInput => 1,
            Self::User => 2,
            Self::Message => 3,
        }
    }
}

/// One remotely-registered command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandManifestEntry {
    pub name: String,
    pub description: String,
    pub kind: ManifestKind,
    /// Platform-shaped options payload (argument schema, defaults to `[]`).
    #[serde(default)]
    pub options: Option<Value>,
}

impl CommandManifestEntry {
    pub fn slash(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: ManifestKind::ChatInput,
            options: None,
        }
    }

    pub fn user_menu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: ManifestKind::User,
            options: None,
        }
    }

    pub fn message_menu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: ManifestKind::Message,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// The wire shape the remote catalog expects.
    pub fn to_manifest_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "type": self.kind.discriminant(),
            "options": self.options.clone().unwrap_or_else(|| json!([])),
        })
    }
}

/// Bot credentials presented on the publish call.
#[derive(Debug, Clone)]
pub struct BotCredentials {
    pub token: String,
}

impl BotCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Where a publish lands: globally, or scoped to one community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestScope {
    pub application_id: String,
    pub community_id: Option<String>,
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct DeploySummary {
    /// Exact number of commands the platform now carries for this scope.
    pub published: usize,
    pub scope: ManifestScope,
}

/// Errors from the publish path. Transport failures are never swallowed.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest publish failed: {0}")]
    Transport(#[source] BoxError),
}

/// Outbound seam for the full-replace publish call.
#[async_trait]
pub trait ManifestTransport: Send + Sync {
    /// Replaces the remote command set for `scope` with `body` (a JSON
    /// array) and returns the number of commands now registered.
    async fn put_commands(
        &self,
        credentials: &BotCredentials,
        scope: &ManifestScope,
        body: &Value,
    ) -> Result<usize, BoxError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Records every publish; returns the body length as the count.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub calls: Mutex<Vec<(ManifestScope, Value)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl ManifestTransport for RecordingTransport {
        async fn put_commands(
            &self,
            _credentials: &BotCredentials,
            scope: &ManifestScope,
            body: &Value,
        ) -> Result<usize, BoxError> {
            if self.fail {
                return Err("connection refused".into());
            }
            let count = body.as_array().map_or(0, Vec::len);
            self.calls.lock().push((scope.clone(), body.clone()));
            Ok(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingTransport;
    use super::*;
    use crate::interaction::{IdMatcher, Interaction, InteractionRouter};
    use std::sync::Arc;

    fn ack(_interaction: Arc<Interaction>) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }

    #[tokio::test]
    async fn deploy_reports_exact_count_and_is_idempotent() {
        let router = InteractionRouter::new();
        router.register_slash(CommandManifestEntry::slash("ping", "healthcheck"), ack);
        router.register_slash(CommandManifestEntry::slash("help", "list commands"), ack);
        router.register_context_menu(CommandManifestEntry::user_menu("Report User"), ack);
        // Components never reach the manifest.
        router.register_component(IdMatcher::exact("ticket:close"), ack);

        let transport = RecordingTransport::default();
        let credentials = BotCredentials::new("token");

        let first = router
            .deploy_manifest(&transport, &credentials, "app-1", Some("guild-1"))
            .await
            .unwrap();
        let second = router
            .deploy_manifest(&transport, &credentials, "app-1", Some("guild-1"))
            .await
            .unwrap();

        assert_eq!(first.published, 3);
        assert_eq!(second.published, 3);

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 2);
        // Full replace: both publishes carry the complete, identical set.
        assert_eq!(calls[0].1, calls[1].1);
        assert_eq!(calls[0].0.community_id.as_deref(), Some("guild-1"));
    }

    #[tokio::test]
    async fn global_scope_when_no_community_given() {
        let router = InteractionRouter::new();
        router.register_slash(CommandManifestEntry::slash("ping", "healthcheck"), ack);

        let transport = RecordingTransport::default();
        let summary = router
            .deploy_manifest(&transport, &BotCredentials::new("t"), "app-1", None)
            .await
            .unwrap();
        assert_eq!(summary.scope.community_id, None);
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let router = InteractionRouter::new();
        router.register_slash(CommandManifestEntry::slash("ping", "healthcheck"), ack);

        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let err = router
            .deploy_manifest(&transport, &BotCredentials::new("t"), "app-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Transport(_)));
    }

    #[test]
    fn manifest_value_shape() {
        let entry = CommandManifestEntry::slash("ping", "healthcheck");
        let value = entry.to_manifest_value();
        assert_eq!(value["name"], "ping");
        assert_eq!(value["type"], 1);
        assert_eq!(value["options"], serde_json::json!([]));
    }
}
