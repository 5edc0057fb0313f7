//! Shared value types for the admission domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (credentials are non-empty and redacted,
//! descriptors are immutable once registered) and participate in the stage
//! chain's decisions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ErrorKind;
use crate::identifiers::{CapabilityId, OperationName, PlanTier, RequestId, Scope};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// An opaque bearer token supplied per request.
///
/// The pipeline never parses a credential. It is forwarded to the upstream
/// client verbatim and used as the per-credential rate-limit partition key;
/// it is never persisted.
///
/// `Debug` and `Display` are redacted so a token can never leak into spans,
/// log events, or error messages. Call [`Credential::expose`] at the single
/// point where the raw token must leave the process (the upstream request).
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Credential(String);

impl Credential {
    /// Creates a credential, returning `None` if the token is empty.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let t = token.into();
        if t.is_empty() { None } else { Some(Self(t)) }
    }

    /// Returns the raw token. Only the upstream adapter should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the rate-limit partition key for this credential.
    pub fn partition_key(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<redacted>)")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<redacted>")
    }
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// The identity derived from a [`Credential`] by the credential resolver.
///
/// Resolved once per request by the Authenticate stage, immutable afterwards,
/// and discarded when the request completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The billing plan tier this credential belongs to.
    pub plan: PlanTier,
    /// The scopes granted to this credential, independent of the plan tier.
    pub granted_scopes: HashSet<Scope>,
}

impl Principal {
    /// Creates a principal with the given tier and scopes.
    pub fn new(plan: PlanTier, granted_scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            plan,
            granted_scopes: granted_scopes.into_iter().collect(),
        }
    }

    /// Returns `true` if every scope in `required` is granted.
    pub fn has_scopes<'a>(&self, required: impl IntoIterator<Item = &'a Scope>) -> bool {
        required.into_iter().all(|s| self.granted_scopes.contains(s))
    }
}

// ---------------------------------------------------------------------------
// Operation descriptors
// ---------------------------------------------------------------------------

/// Static metadata for one exposed operation, compiled at startup.
///
/// Every operation the router exposes has exactly one descriptor, registered
/// in [`crate::PolicyTables`]. The pipeline consults the descriptor only; it
/// never inspects the request payload's business content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// The operation's router-visible name.
    pub name: OperationName,
    /// The capability the caller's plan tier must grant.
    pub required_capability: CapabilityId,
    /// The scopes the caller's credential must carry.
    #[serde(default)]
    pub required_scopes: HashSet<Scope>,
    /// Whether the operation destroys or wholesale-overwrites data and so
    /// requires an explicit confirmation flag on the request.
    #[serde(default)]
    pub destructive: bool,
    /// Whether the operation's payload carries an item collection subject to
    /// the upstream invoker's batch-size ceiling.
    #[serde(default)]
    pub batch: bool,
}

// ---------------------------------------------------------------------------
// Requests and decisions
// ---------------------------------------------------------------------------

/// One inbound unit of work, as supplied by the router.
///
/// The router owns HTTP method/path mapping and body parsing; by the time a
/// request reaches the pipeline it is already reduced to operation metadata,
/// an opaque payload, and the out-of-band confirmation flag.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// The operation being requested.
    pub operation: OperationName,
    /// The opaque payload forwarded to the upstream on admission.
    pub payload: Value,
    /// The bearer credential, if the router extracted one.
    pub credential: Option<Credential>,
    /// Explicit opt-in for destructive operations. Carried out-of-band from
    /// the payload (request-level flag or header), never inferred from it.
    pub confirmed: bool,
}

/// How one pass through the pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum DecisionOutcome {
    /// All stages passed and the upstream call completed successfully.
    Admitted,
    /// A stage or the upstream invoker produced a terminal error.
    Rejected {
        /// The taxonomy kind of the terminal error.
        kind: ErrorKind,
    },
}

/// Audit summary of one admission decision.
///
/// Produced for every request alongside the wire response; carries only
/// metadata (never the payload or credential) so it is safe to log.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionDecision {
    /// Correlates this decision with the request's tracing span.
    pub request_id: RequestId,
    /// The operation that was requested.
    pub operation: OperationName,
    /// Terminal outcome of the stage chain and invoker.
    pub outcome: DecisionOutcome,
    /// Wall-clock time at which the decision was made.
    pub decided_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
