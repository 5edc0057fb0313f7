//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging — for example —
//! an [`OperationName`] with a [`CapabilityId`] even though both are `String`
//! under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (policy data / configuration)
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies an operation the router exposes (e.g. `"records.list"`,
    /// `"webhooks.delete"`).
    ///
    /// Every exposed operation has exactly one registered
    /// [`crate::OperationDescriptor`]; an unregistered name reaching the
    /// pipeline is a configuration defect, not routine traffic.
    OperationName
}

string_id! {
    /// Identifies a named permission class gating a set of operations
    /// (e.g. `"records:write"`, `"schema:modify"`).
    ///
    /// Capabilities are granted per plan tier by the
    /// [`crate::PlanCapabilityTable`].
    CapabilityId
}

string_id! {
    /// A fine-grained credential permission, distinct from the plan tier.
    ///
    /// Both the plan tier and the credential's scopes must independently
    /// permit an operation.
    Scope
}

string_id! {
    /// Identifies a billing/subscription level (e.g. `"free"`, `"team"`).
    ///
    /// Tiers do **not** form a total order: one tier's capability set need
    /// not be a superset of another's. Every capability lookup works from
    /// explicit grant records, never from tier comparison.
    PlanTier
}

string_id! {
    /// Identifies the target resource a request is charged against for
    /// per-resource rate limiting (e.g. the remote API base).
    ResourceId
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pass through the admission pipeline.
///
/// Generated fresh for every inbound request; propagated through spans and
/// the [`crate::AdmissionDecision`] record so all activity for one request
/// can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RequestId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
