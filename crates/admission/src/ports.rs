//! Port trait definitions for the pipeline's external collaborators.
//!
//! The pipeline consumes two capabilities it does not implement: resolving a
//! credential to a [`Principal`], and calling the remote API. Infrastructure
//! crates implement these traits; the pipeline never sees transport details.
//!
//! [`StaticCredentialResolver`] is the one bundled implementation: a pure
//! in-memory token table used by the composition root and by tests. Real
//! identity backends implement [`CredentialResolver`] in their own crates.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::identifiers::OperationName;
use crate::types::{Credential, Principal};

// ---------------------------------------------------------------------------
// Credential resolution
// ---------------------------------------------------------------------------

/// Why a credential could not be resolved to a principal.
///
/// The pipeline converts this into the `Unauthenticated` taxonomy kind; the
/// reason must therefore be safe for caller display (no token material).
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct CredentialRejected {
    /// Caller-safe description of the rejection.
    pub reason: String,
}

impl CredentialRejected {
    /// Creates a rejection with the given caller-safe reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Resolves a bearer credential to the [`Principal`] it identifies.
///
/// Called exactly once per request, by the Authenticate stage.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolves `credential`, or rejects it with a caller-safe reason.
    async fn resolve(&self, credential: &Credential) -> Result<Principal, CredentialRejected>;
}

/// In-memory token table implementing [`CredentialResolver`].
///
/// Constructed by the composition root from configuration. Lookup is by the
/// raw token; unknown tokens are rejected without revealing whether the
/// token was close to a valid one.
#[derive(Debug, Default)]
pub struct StaticCredentialResolver {
    principals: HashMap<String, Principal>,
}

impl StaticCredentialResolver {
    /// Builds a resolver from `(credential, principal)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (Credential, Principal)>) -> Self {
        Self {
            principals: entries
                .into_iter()
                .map(|(credential, principal)| (credential.expose().to_string(), principal))
                .collect(),
        }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, credential: &Credential) -> Result<Principal, CredentialRejected> {
        self.principals
            .get(credential.expose())
            .cloned()
            .ok_or_else(|| CredentialRejected::new("unknown credential"))
    }
}

// ---------------------------------------------------------------------------
// Upstream client
// ---------------------------------------------------------------------------

/// Classification of an upstream failure.
///
/// [`UpstreamFailureKind::Overloaded`] is the distinguished "too many
/// requests" condition eligible for the invoker's single automatic retry;
/// every other kind propagates on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamFailureKind {
    /// The remote API reported too many requests.
    Overloaded,
    /// The addressed entity does not exist upstream.
    NotFound,
    /// The remote API rejected the request content.
    Validation,
    /// The remote API failed internally.
    Server,
    /// The request never produced an upstream response (connect failure,
    /// timeout, protocol error).
    Transport,
    /// Any other upstream response the adapter does not classify.
    Other,
}

/// A normalised upstream failure.
///
/// The adapter maps transport and status-code conditions onto this shape;
/// the upstream's own error payload travels in `detail` unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamFailure {
    /// The upstream HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Classification of the failure.
    pub kind: UpstreamFailureKind,
    /// The upstream's error payload, passed through unmodified.
    pub detail: Value,
}

impl UpstreamFailure {
    /// Creates a failure from its parts.
    pub fn new(kind: UpstreamFailureKind, status: Option<u16>, detail: Value) -> Self {
        Self {
            status,
            kind,
            detail,
        }
    }

    /// Creates the distinguished overload failure.
    pub fn overloaded(detail: Value) -> Self {
        Self::new(UpstreamFailureKind::Overloaded, Some(429), detail)
    }

    /// Creates a transport-level failure (no upstream response).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(
            UpstreamFailureKind::Transport,
            None,
            Value::String(message.into()),
        )
    }

    /// Returns `true` for the overload condition eligible for automatic retry.
    pub fn is_overload(&self) -> bool {
        self.kind == UpstreamFailureKind::Overloaded
    }
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "upstream failure ({:?}, status {status})", self.kind),
            None => write!(f, "upstream failure ({:?})", self.kind),
        }
    }
}

/// The remote API, as seen by the upstream invoker.
///
/// One call corresponds to one remote request; retry and normalisation
/// policy live in the invoker, not in implementations.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Performs `operation` with `payload` on behalf of `credential`.
    async fn call(
        &self,
        operation: &OperationName,
        payload: &Value,
        credential: &Credential,
    ) -> Result<Value, UpstreamFailure>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::identifiers::{PlanTier, Scope};

    fn principal() -> Principal {
        Principal::new(
            PlanTier::new("team").unwrap(),
            [Scope::new("data:read").unwrap()],
        )
    }

    #[tokio::test]
    async fn static_resolver_resolves_known_tokens() {
        let token = Credential::new("tok_known").unwrap();
        let resolver = StaticCredentialResolver::new([(token.clone(), principal())]);

        let resolved = resolver.resolve(&token).await.unwrap();
        assert_eq!(resolved, principal());
    }

    #[tokio::test]
    async fn static_resolver_rejects_unknown_tokens() {
        let resolver = StaticCredentialResolver::new([]);
        let rejection = resolver
            .resolve(&Credential::new("tok_unknown").unwrap())
            .await
            .unwrap_err();
        assert_eq!(rejection.reason, "unknown credential");
    }

    #[test]
    fn overload_is_the_only_retry_eligible_kind() {
        assert!(UpstreamFailure::overloaded(Value::Null).is_overload());
        for kind in [
            UpstreamFailureKind::NotFound,
            UpstreamFailureKind::Validation,
            UpstreamFailureKind::Server,
            UpstreamFailureKind::Transport,
            UpstreamFailureKind::Other,
        ] {
            assert!(!UpstreamFailure::new(kind, Some(500), Value::Null).is_overload());
        }
    }

    #[test]
    fn display_never_includes_the_detail_payload() {
        let failure = UpstreamFailure::new(
            UpstreamFailureKind::Validation,
            Some(422),
            serde_json::json!({"field": "email"}),
        );
        let display = failure.to_string();
        assert!(display.contains("422"));
        assert!(!display.contains("email"));
    }
}
