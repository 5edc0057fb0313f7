//! Admission-control domain for a gateway mediating a quota-constrained,
//! plan-tiered remote API.
//!
//! This crate contains every domain concept, newtype identifier, policy
//! table, and cross-cutting error type of the admission pipeline, plus the
//! port traits its collaborators implement. Infrastructure crates implement
//! the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply
//! it. The router in front and the HTTP transport behind are both external
//! collaborators.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`OperationName`, `CapabilityId`, etc.) |
//! | [`types`] | Shared value types (`Credential`, `Principal`, `OperationDescriptor`, etc.) |
//! | [`errors`] | The terminal error taxonomy and retry-policy types |
//! | [`policy`] | Operation descriptors and the plan-capability grant table |
//! | [`limiter`] | Fixed-window rate limiting over two named partitions |
//! | [`pipeline`] | The ordered, short-circuiting authorization stage chain |
//! | [`invoker`] | Upstream invocation with overload backoff and batch ceiling |
//! | [`response`] | Translation of terminal outcomes to the wire contract |
//! | [`ports`] | `CredentialResolver` and `UpstreamClient` trait definitions |
//! | [`config`] | serde shapes, defaults, and validation for gateway settings |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod invoker;
pub mod limiter;
pub mod pipeline;
pub mod policy;
pub mod ports;
pub mod response;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{GatewayConfig, InvokerConfig, LimitConfig, LimitsConfig, PrincipalConfig, UpstreamConfig};
pub use errors::{AdmissionError, ErrorKind, RetryPolicy};
pub use identifiers::{CapabilityId, OperationName, PlanTier, RequestId, ResourceId, Scope};
pub use invoker::{InvokerPolicy, UpstreamInvoker};
pub use limiter::{Decision, FixedWindowLimiter, LimiterScope};
pub use pipeline::{AdmissionOutcome, AdmissionPipeline};
pub use policy::{PlanCapabilityTable, PlanGrant, PolicyTables};
pub use ports::{
    CredentialRejected, CredentialResolver, StaticCredentialResolver, UpstreamClient,
    UpstreamFailure, UpstreamFailureKind,
};
pub use response::{GatewayResponse, ResponseError};
pub use types::{
    AdmissionDecision, AdmissionRequest, Credential, DecisionOutcome, OperationDescriptor,
    Principal, Timestamp,
};
