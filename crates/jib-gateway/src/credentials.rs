//! Upstream service credentials resolved once at startup.
//!
//! Secrets never appear in `Debug` output or tracing events; the only places
//! a credential value leaves this module are the upstream request header and
//! the executor's credential-injected push URL.

use std::fmt;

/// Credential used to authenticate against the upstream chat API.
#[derive(Clone, PartialEq, Eq)]
pub enum ServiceCredential {
    /// Plain API key, forwarded via `x-api-key`.
    ApiKey { value: String },
    /// OAuth access token, forwarded via `Authorization: Bearer`.
    OAuth { token: String },
}

impl ServiceCredential {
    /// Header name the credential is injected under.
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "x-api-key",
            Self::OAuth { .. } => "authorization",
        }
    }

    /// Header value carrying the secret, scheme included where required.
    pub fn header_value(&self) -> String {
        match self {
            Self::ApiKey { value } => value.clone(),
            Self::OAuth { token } => format!("Bearer {token}"),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api-key",
            Self::OAuth { .. } => "oauth",
        }
    }
}

impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredential")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Container-scoped credentials the host injects at startup.
#[derive(Clone, Default)]
pub struct CredentialStore {
    pub chat: Option<ServiceCredential>,
    pub github: Option<String>,
}

impl CredentialStore {
    /// Builds the store from startup secrets. The OAuth token wins when both
    /// chat secrets are configured; blank values count as absent.
    pub fn new(
        chat_api_key: Option<String>,
        chat_oauth_token: Option<String>,
        github_token: Option<String>,
    ) -> Self {
        let chat = match (
            normalize_secret(chat_oauth_token),
            normalize_secret(chat_api_key),
        ) {
            (Some(token), _) => Some(ServiceCredential::OAuth { token }),
            (None, Some(value)) => Some(ServiceCredential::ApiKey { value }),
            (None, None) => None,
        };
        Self {
            chat,
            github: normalize_secret(github_token),
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("chat", &self.chat)
            .field("github", &self.github.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn normalize_secret(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
