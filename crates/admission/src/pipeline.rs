//! The authorization stage chain.
//!
//! A fixed, short-circuiting sequence. Stage order is a contract, not an
//! implementation detail — it determines which error a caller sees first:
//!
//! 1. Authenticate — resolve the credential to a [`Principal`].
//! 2. Entitlement — the plan tier must grant the operation's capability.
//! 3. Scope — the credential must carry every required scope.
//! 4. Destructive confirmation — before any quota is consumed, so an
//!    unconfirmed destructive attempt never burns capacity.
//! 5. Admission — resource limiter first (cheaper partition, fails fast),
//!    then credential limiter.
//!
//! Any rejection is terminal: later stages never run and the upstream is
//! never contacted. The pipeline holds no per-request state of its own; one
//! `handle` call corresponds to exactly one external request, and the only
//! shared mutable state is inside the injected limiters.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::errors::AdmissionError;
use crate::identifiers::{RequestId, ResourceId};
use crate::invoker::UpstreamInvoker;
use crate::limiter::{Decision, FixedWindowLimiter};
use crate::policy::PolicyTables;
use crate::ports::CredentialResolver;
use crate::response::GatewayResponse;
use crate::types::{
    AdmissionDecision, AdmissionRequest, Credential, DecisionOutcome, OperationDescriptor,
    Principal, Timestamp,
};

/// The complete outcome of one admission pass: the wire response plus the
/// loggable decision record.
#[derive(Debug)]
pub struct AdmissionOutcome {
    /// The response contract value for the router to return.
    pub response: GatewayResponse,
    /// Metadata-only audit summary of the decision.
    pub decision: AdmissionDecision,
}

/// The admission-control pipeline.
///
/// All collaborators are injected at construction; there are no module-level
/// singletons, so isolated tests can build a pipeline per case. The pipeline
/// is shared (behind `Arc`) by every concurrent request.
pub struct AdmissionPipeline {
    resolver: Arc<dyn CredentialResolver>,
    policy: Arc<PolicyTables>,
    resource_limiter: Arc<FixedWindowLimiter>,
    credential_limiter: Arc<FixedWindowLimiter>,
    invoker: UpstreamInvoker,
    resource: ResourceId,
}

impl AdmissionPipeline {
    /// Builds a pipeline over the injected collaborators.
    ///
    /// `resource` keys the per-resource limiter partition; a gateway mediating
    /// a single remote base passes that base's identity.
    pub fn new(
        resolver: Arc<dyn CredentialResolver>,
        policy: Arc<PolicyTables>,
        resource_limiter: Arc<FixedWindowLimiter>,
        credential_limiter: Arc<FixedWindowLimiter>,
        invoker: UpstreamInvoker,
        resource: ResourceId,
    ) -> Self {
        Self {
            resolver,
            policy,
            resource_limiter,
            credential_limiter,
            invoker,
            resource,
        }
    }

    /// Runs one request through the stage chain and translates the outcome.
    pub async fn handle(&self, request: AdmissionRequest) -> AdmissionOutcome {
        let request_id = RequestId::new_random();
        let span = tracing::info_span!(
            "admission",
            request_id = %request_id,
            operation = %request.operation,
        );

        let result = self.admit(&request).instrument(span).await;

        let outcome = match &result {
            Ok(_) => DecisionOutcome::Admitted,
            Err(error) => {
                tracing::warn!(
                    request_id = %request_id,
                    operation = %request.operation,
                    kind = %error.kind(),
                    "request rejected: {error}"
                );
                DecisionOutcome::Rejected { kind: error.kind() }
            }
        };

        AdmissionOutcome {
            response: result.into(),
            decision: AdmissionDecision {
                request_id,
                operation: request.operation,
                outcome,
                decided_at: Timestamp::now(),
            },
        }
    }

    /// The stage chain proper. Returns the upstream result or the earliest
    /// stage's taxonomy error.
    async fn admit(&self, request: &AdmissionRequest) -> Result<Value, AdmissionError> {
        let (credential, principal) = self.authenticate(request).await?;
        let descriptor = self.policy.descriptor(&request.operation)?;

        self.check_entitlement(&principal, descriptor)?;
        self.check_scopes(&principal, descriptor)?;
        self.check_confirmation(request, descriptor.destructive)?;
        self.admit_quota(credential)?;

        self.invoker
            .invoke(descriptor, &request.payload, credential)
            .await
    }

    /// Stage 1: require a credential and resolve it to a principal.
    async fn authenticate<'a>(
        &self,
        request: &'a AdmissionRequest,
    ) -> Result<(&'a Credential, Principal), AdmissionError> {
        let credential =
            request
                .credential
                .as_ref()
                .ok_or_else(|| AdmissionError::Unauthenticated {
                    reason: "no credential supplied".into(),
                })?;

        let principal = self.resolver.resolve(credential).await.map_err(|rejected| {
            AdmissionError::Unauthenticated {
                reason: rejected.reason,
            }
        })?;

        tracing::debug!(plan = %principal.plan, "credential resolved");
        Ok((credential, principal))
    }

    /// Stage 2: the plan tier must grant the operation's capability.
    fn check_entitlement(
        &self,
        principal: &Principal,
        descriptor: &OperationDescriptor,
    ) -> Result<(), AdmissionError> {
        let capability = &descriptor.required_capability;
        if self.policy.grants(&principal.plan, capability) {
            return Ok(());
        }
        Err(AdmissionError::FeatureUnavailable {
            capability: capability.clone(),
            required_plan: self.policy.lowest_tier_granting(capability).cloned(),
        })
    }

    /// Stage 3: the credential must carry every required scope.
    fn check_scopes(
        &self,
        principal: &Principal,
        descriptor: &OperationDescriptor,
    ) -> Result<(), AdmissionError> {
        let missing: Vec<_> = descriptor
            .required_scopes
            .iter()
            .filter(|s| !principal.granted_scopes.contains(*s))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(AdmissionError::InsufficientPermissions {
            missing_scopes: missing,
        })
    }

    /// Stage 4: destructive operations need the explicit opt-in flag.
    ///
    /// Runs strictly before quota admission so unconfirmed destructive
    /// attempts never consume capacity.
    fn check_confirmation(
        &self,
        request: &AdmissionRequest,
        destructive: bool,
    ) -> Result<(), AdmissionError> {
        if destructive && !request.confirmed {
            return Err(AdmissionError::ConfirmationRequired {
                operation: request.operation.clone(),
            });
        }
        Ok(())
    }

    /// Stage 5: consume capacity from both partitions, resource first.
    fn admit_quota(&self, credential: &Credential) -> Result<(), AdmissionError> {
        for (limiter, key) in [
            (&self.resource_limiter, self.resource.as_str()),
            (&self.credential_limiter, credential.partition_key()),
        ] {
            if let Decision::Denied { retry_after } = limiter.try_acquire(key) {
                return Err(AdmissionError::RateLimited {
                    scope: limiter.scope(),
                    retry_after,
                });
            }
        }
        Ok(())
    }
}
