//! The terminal error taxonomy and retry-policy types.
//!
//! Every stage rejection and every upstream failure is converted into an
//! [`AdmissionError`] at its origin; no other error type crosses a component
//! boundary. The taxonomy is exhaustive: each variant corresponds to exactly
//! one wire-visible [`ErrorKind`].
//!
//! [`RetryPolicy`] is a cross-cutting concern: callers drive their backoff
//! from [`AdmissionError::retry_policy`] instead of matching on message text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identifiers::{CapabilityId, OperationName, PlanTier, Scope};
use crate::limiter::LimiterScope;
use crate::ports::UpstreamFailure;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`AdmissionError::retry_policy`] to let callers decide whether
/// to re-submit an operation without inspecting variant internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// the remaining rate-limit window).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Retrying without changing the request cannot succeed.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Taxonomy kinds
// ---------------------------------------------------------------------------

/// The stable, wire-visible classification of a terminal error.
///
/// Serialised as `snake_case` in the response contract. The set is closed:
/// every internal failure maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid credential.
    Unauthenticated,
    /// The caller's plan tier does not grant the required capability.
    FeatureUnavailable,
    /// The credential lacks one or more required scopes.
    InsufficientPermissions,
    /// Destructive operation submitted without explicit confirmation.
    ConfirmationRequired,
    /// Malformed payload, including batches over the upstream's ceiling.
    InvalidRequest,
    /// A rate-limit partition is exhausted.
    RateLimited,
    /// The remote API returned a non-overload failure.
    UpstreamError,
    /// Unknown operation or policy misconfiguration. A deployment defect,
    /// never routine traffic.
    ConfigurationError,
}

impl ErrorKind {
    /// Returns the wire representation of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::FeatureUnavailable => "feature_unavailable",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::ConfirmationRequired => "confirmation_required",
            Self::InvalidRequest => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Terminal errors
// ---------------------------------------------------------------------------

/// A terminal pipeline outcome: one stage rejection or upstream failure.
///
/// Carries the caller-relevant detail for its kind (remaining window for
/// [`AdmissionError::RateLimited`], lowest granting tier for
/// [`AdmissionError::FeatureUnavailable`], and so on) so translation to the
/// response contract is lossless.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The request carried no credential, or the resolver rejected it.
    #[error("authentication failed: {reason}")]
    Unauthenticated {
        /// Resolver-supplied reason, safe for caller display.
        reason: String,
    },

    /// The caller's plan tier does not grant the capability the operation
    /// requires.
    #[error("plan tier does not include capability '{capability}'")]
    FeatureUnavailable {
        /// The capability the operation requires.
        capability: CapabilityId,
        /// The lowest tier (by declaration-order table scan, not tier
        /// ordering) that grants the capability. `None` if no tier does.
        required_plan: Option<PlanTier>,
    },

    /// The credential lacks one or more scopes the operation requires.
    #[error("credential lacks required scope(s): {missing_scopes:?}")]
    InsufficientPermissions {
        /// The required scopes the credential does not carry.
        missing_scopes: Vec<Scope>,
    },

    /// A destructive operation was submitted without `confirmed == true`.
    #[error("operation '{operation}' is destructive and requires explicit confirmation")]
    ConfirmationRequired {
        /// The destructive operation that was attempted.
        operation: OperationName,
    },

    /// The request is malformed in a way the pipeline detects locally,
    /// e.g. a batch exceeding the upstream's documented item ceiling.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the defect, safe for caller display.
        message: String,
    },

    /// One of the two rate-limit partitions is exhausted.
    #[error("rate limit exceeded for {scope} partition")]
    RateLimited {
        /// Which limiter tripped.
        scope: LimiterScope,
        /// Time until the partition's window rolls over.
        retry_after: Duration,
    },

    /// The remote API failed with a non-overload condition, or remained
    /// overloaded after the invoker's single automatic retry.
    #[error("{failure}")]
    Upstream {
        /// The normalised upstream failure, payload untouched.
        failure: UpstreamFailure,
    },

    /// Unknown operation or inconsistent policy data. Fatal configuration
    /// defect; must not occur in production traffic.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },
}

impl AdmissionError {
    /// Returns the wire-visible classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::FeatureUnavailable { .. } => ErrorKind::FeatureUnavailable,
            Self::InsufficientPermissions { .. } => ErrorKind::InsufficientPermissions,
            Self::ConfirmationRequired { .. } => ErrorKind::ConfirmationRequired,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Configuration { .. } => ErrorKind::ConfigurationError,
        }
    }

    /// Returns whether a caller may safely retry the same request.
    ///
    /// Only rate-limit exhaustion (retry after the reported window) and an
    /// upstream that stayed overloaded are retryable; every other kind needs
    /// the request or the deployment changed first.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { retry_after, .. } => RetryPolicy::Retryable {
                after: Some(*retry_after),
            },
            Self::Upstream { failure } if failure.is_overload() => {
                RetryPolicy::Retryable { after: None }
            }
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Shorthand for a configuration error with a formatted message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
