//! Gateway configuration types.
//!
//! Deserialised from TOML by the composition root; this module only defines
//! the serde shapes, their defaults, and validation. Defaults follow the
//! gateway's shipped policy: 5 requests/s per resource, 50 requests/s per
//! credential, a 30 s overload cooldown, and a 10-item batch ceiling.
//!
//! Validation failures are [`crate::ErrorKind::ConfigurationError`]: the
//! process must refuse to start rather than admit traffic under a broken
//! policy.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::AdmissionError;
use crate::identifiers::{PlanTier, Scope};
use crate::invoker::InvokerPolicy;
use crate::policy::PlanGrant;
use crate::types::{Credential, OperationDescriptor, Principal};

/// One rate-limit partition's settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    /// Maximum requests admitted per window per key.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl LimitConfig {
    /// Returns the window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Settings for both limiter partitions.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// The per-resource partition (keyed by the remote base).
    #[serde(default = "LimitsConfig::default_resource")]
    pub resource: LimitConfig,
    /// The per-credential partition.
    #[serde(default = "LimitsConfig::default_credential")]
    pub credential: LimitConfig,
}

impl LimitsConfig {
    fn default_resource() -> LimitConfig {
        LimitConfig {
            max_requests: 5,
            window_ms: 1_000,
        }
    }

    fn default_credential() -> LimitConfig {
        LimitConfig {
            max_requests: 50,
            window_ms: 1_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            resource: Self::default_resource(),
            credential: Self::default_credential(),
        }
    }
}

/// Upstream invocation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokerConfig {
    /// Cooldown before the single automatic retry after an overload signal.
    #[serde(default = "InvokerConfig::default_cooldown_secs")]
    pub overload_cooldown_secs: u64,
    /// Item ceiling for batch-shaped operations.
    #[serde(default = "InvokerConfig::default_max_batch_items")]
    pub max_batch_items: usize,
}

impl InvokerConfig {
    fn default_cooldown_secs() -> u64 {
        30
    }

    fn default_max_batch_items() -> usize {
        10
    }

    /// Converts to the invoker's runtime policy.
    pub fn policy(&self) -> InvokerPolicy {
        InvokerPolicy {
            overload_cooldown: Duration::from_secs(self.overload_cooldown_secs),
            max_batch_items: self.max_batch_items,
        }
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            overload_cooldown_secs: Self::default_cooldown_secs(),
            max_batch_items: Self::default_max_batch_items(),
        }
    }
}

/// Where the upstream adapter sends admitted requests.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the remote API; also keys the per-resource limiter.
    pub base_url: String,
}

/// One credential the bundled static resolver recognises.
#[derive(Debug, Clone, Deserialize)]
pub struct PrincipalConfig {
    /// The bearer token.
    pub token: Credential,
    /// The plan tier the token belongs to.
    pub plan: PlanTier,
    /// The scopes granted to the token.
    #[serde(default)]
    pub scopes: HashSet<Scope>,
}

impl PrincipalConfig {
    /// Converts to a `(credential, principal)` resolver entry.
    pub fn into_entry(self) -> (Credential, Principal) {
        (
            self.token,
            Principal {
                plan: self.plan,
                granted_scopes: self.scopes,
            },
        )
    }
}

/// The complete gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Rate-limit partitions.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Upstream invocation policy.
    #[serde(default)]
    pub invoker: InvokerConfig,
    /// Remote API endpoint.
    pub upstream: UpstreamConfig,
    /// Plan-capability grant records, declared cheapest tier first.
    #[serde(default)]
    pub plans: Vec<PlanGrant>,
    /// Operation descriptors for everything the router exposes.
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
    /// Static token table for the bundled credential resolver.
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,
}

impl GatewayConfig {
    /// Checks values the serde layer cannot: non-zero limits and windows,
    /// a non-empty upstream base, and non-empty identifiers. Deserialisation
    /// fills the newtypes directly, so the non-empty rule their constructors
    /// enforce has to be re-checked here.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` describing the first defect found.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        for (name, limit) in [
            ("limits.resource", &self.limits.resource),
            ("limits.credential", &self.limits.credential),
        ] {
            if limit.max_requests == 0 {
                return Err(AdmissionError::configuration(format!(
                    "{name}.max_requests must be non-zero"
                )));
            }
            if limit.window_ms == 0 {
                return Err(AdmissionError::configuration(format!(
                    "{name}.window_ms must be non-zero"
                )));
            }
        }

        if self.upstream.base_url.trim().is_empty() {
            return Err(AdmissionError::configuration(
                "upstream.base_url must not be empty",
            ));
        }

        if self.operations.is_empty() {
            return Err(AdmissionError::configuration(
                "at least one operation must be registered",
            ));
        }

        for descriptor in &self.operations {
            if descriptor.name.as_str().is_empty() {
                return Err(AdmissionError::configuration(
                    "operation names must not be empty",
                ));
            }
            if descriptor.required_capability.as_str().is_empty() {
                return Err(AdmissionError::configuration(format!(
                    "operation '{}' has an empty required_capability",
                    descriptor.name
                )));
            }
        }

        for grant in &self.plans {
            if grant.tier.as_str().is_empty() {
                return Err(AdmissionError::configuration(
                    "plan tier names must not be empty",
                ));
            }
        }

        for principal in &self.principals {
            if principal.token.expose().is_empty() {
                return Err(AdmissionError::configuration(
                    "principal tokens must not be empty",
                ));
            }
            if principal.plan.as_str().is_empty() {
                return Err(AdmissionError::configuration(
                    "principal plan tiers must not be empty",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::identifiers::{CapabilityId, OperationName};

    fn minimal() -> GatewayConfig {
        GatewayConfig {
            limits: LimitsConfig::default(),
            invoker: InvokerConfig::default(),
            upstream: UpstreamConfig {
                base_url: "https://api.example.com/v0/base_main".into(),
            },
            plans: vec![],
            operations: vec![OperationDescriptor {
                name: OperationName::new("records.list").unwrap(),
                required_capability: CapabilityId::new("records:read").unwrap(),
                required_scopes: HashSet::new(),
                destructive: false,
                batch: false,
            }],
            principals: vec![],
        }
    }

    #[test]
    fn defaults_match_the_shipped_policy() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.resource.max_requests, 5);
        assert_eq!(limits.resource.window(), Duration::from_secs(1));
        assert_eq!(limits.credential.max_requests, 50);

        let invoker = InvokerConfig::default();
        assert_eq!(invoker.policy().overload_cooldown, Duration::from_secs(30));
        assert_eq!(invoker.policy().max_batch_items, 10);
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn zero_limit_fails_validation() {
        let mut config = minimal();
        config.limits.resource.max_requests = 0;
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn zero_window_fails_validation() {
        let mut config = minimal();
        config.limits.credential.window_ms = 0;
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn empty_base_url_fails_validation() {
        let mut config = minimal();
        config.upstream.base_url = "  ".into();
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn empty_operation_table_fails_validation() {
        let mut config = minimal();
        config.operations.clear();
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    // The newtypes deserialise from raw strings, so an empty value in the
    // config file slips past their constructors; validate() must catch it.
    #[test]
    fn deserialised_empty_principal_token_fails_validation() {
        let mut config = minimal();
        config.principals.push(
            serde_json::from_value(serde_json::json!({
                "token": "",
                "plan": "free",
            }))
            .unwrap(),
        );
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn deserialised_empty_operation_name_fails_validation() {
        let mut config = minimal();
        config.operations.push(
            serde_json::from_value(serde_json::json!({
                "name": "",
                "required_capability": "records:read",
            }))
            .unwrap(),
        );
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn deserialised_empty_plan_tier_fails_validation() {
        let mut config = minimal();
        config.plans.push(
            serde_json::from_value(serde_json::json!({
                "tier": "",
                "capabilities": ["records:read"],
            }))
            .unwrap(),
        );
        assert_eq!(
            config.validate().unwrap_err().kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn principal_entries_convert_to_resolver_pairs() {
        let entry = PrincipalConfig {
            token: Credential::new("tok_cfg").unwrap(),
            plan: PlanTier::new("team").unwrap(),
            scopes: [Scope::new("data:read").unwrap()].into(),
        };
        let (credential, principal) = entry.into_entry();
        assert_eq!(credential.expose(), "tok_cfg");
        assert_eq!(principal.plan, PlanTier::new("team").unwrap());
        assert!(principal.granted_scopes.contains(&Scope::new("data:read").unwrap()));
    }
}
