//! Static policy tables: operation descriptors and plan-capability grants.
//!
//! Both tables are compiled once at startup and never mutated. Lookups are
//! pure; an unknown operation name is a [`crate::ErrorKind::ConfigurationError`]
//! (the router must only expose registered operations), never a per-request
//! condition.
//!
//! Plan tiers carry **no ordering**. A grant record lists the capabilities
//! one tier holds; a "higher" tier that omits a capability simply does not
//! have it. The lowest tier granting a capability — used for the
//! `FeatureUnavailable` caller message — is found by declaration-order scan.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::AdmissionError;
use crate::identifiers::{CapabilityId, OperationName, PlanTier, Scope};
use crate::types::OperationDescriptor;

// ---------------------------------------------------------------------------
// Plan capability table
// ---------------------------------------------------------------------------

/// The capabilities one plan tier grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanGrant {
    /// The tier this record describes.
    pub tier: PlanTier,
    /// Every capability the tier grants. Not required to be a superset of
    /// any other tier's set.
    #[serde(default)]
    pub capabilities: HashSet<CapabilityId>,
}

/// Mapping from plan tier to granted capabilities.
///
/// Declaration order is preserved: [`PlanCapabilityTable::lowest_tier_granting`]
/// returns the first declared tier that grants a capability, which operators
/// use to order tiers cheapest-first in configuration.
#[derive(Debug, Clone)]
pub struct PlanCapabilityTable {
    grants: Vec<PlanGrant>,
}

impl PlanCapabilityTable {
    /// Builds the table, rejecting duplicate tier records.
    pub fn new(grants: Vec<PlanGrant>) -> Result<Self, AdmissionError> {
        let mut seen: HashSet<&PlanTier> = HashSet::new();
        for grant in &grants {
            if !seen.insert(&grant.tier) {
                return Err(AdmissionError::configuration(format!(
                    "duplicate plan grant record for tier '{}'",
                    grant.tier
                )));
            }
        }
        Ok(Self { grants })
    }

    /// Returns `true` if `tier` grants `capability`.
    ///
    /// Unknown tiers grant nothing.
    pub fn grants(&self, tier: &PlanTier, capability: &CapabilityId) -> bool {
        self.grants
            .iter()
            .find(|g| &g.tier == tier)
            .is_some_and(|g| g.capabilities.contains(capability))
    }

    /// Returns the first declared tier that grants `capability`, if any.
    pub fn lowest_tier_granting(&self, capability: &CapabilityId) -> Option<&PlanTier> {
        self.grants
            .iter()
            .find(|g| g.capabilities.contains(capability))
            .map(|g| &g.tier)
    }
}

// ---------------------------------------------------------------------------
// Combined policy tables
// ---------------------------------------------------------------------------

/// The pipeline's static policy data: operation descriptors plus the plan
/// capability table.
///
/// Constructed once by the composition root and shared (behind `Arc`) by all
/// concurrent requests.
#[derive(Debug)]
pub struct PolicyTables {
    operations: HashMap<OperationName, OperationDescriptor>,
    plans: PlanCapabilityTable,
}

impl PolicyTables {
    /// Builds the tables, rejecting duplicate operation registrations.
    pub fn new(
        operations: Vec<OperationDescriptor>,
        plans: PlanCapabilityTable,
    ) -> Result<Self, AdmissionError> {
        let mut table = HashMap::with_capacity(operations.len());
        for descriptor in operations {
            let name = descriptor.name.clone();
            if table.insert(name.clone(), descriptor).is_some() {
                return Err(AdmissionError::configuration(format!(
                    "operation '{name}' registered twice"
                )));
            }
        }
        Ok(Self {
            operations: table,
            plans,
        })
    }

    /// Looks up the descriptor for `operation`.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the operation was never registered — the
    /// router exposed a name the policy tables do not know.
    pub fn descriptor(&self, operation: &OperationName) -> Result<&OperationDescriptor, AdmissionError> {
        self.operations.get(operation).ok_or_else(|| {
            AdmissionError::configuration(format!(
                "operation '{operation}' has no registered descriptor"
            ))
        })
    }

    /// Returns the capability required by `operation`.
    pub fn capability_for(&self, operation: &OperationName) -> Result<&CapabilityId, AdmissionError> {
        Ok(&self.descriptor(operation)?.required_capability)
    }

    /// Returns the scopes required by `operation`.
    pub fn scopes_for(&self, operation: &OperationName) -> Result<&HashSet<Scope>, AdmissionError> {
        Ok(&self.descriptor(operation)?.required_scopes)
    }

    /// Returns whether `operation` is destructive.
    pub fn is_destructive(&self, operation: &OperationName) -> Result<bool, AdmissionError> {
        Ok(self.descriptor(operation)?.destructive)
    }

    /// Returns `true` if `tier` grants `capability`.
    pub fn grants(&self, tier: &PlanTier, capability: &CapabilityId) -> bool {
        self.plans.grants(tier, capability)
    }

    /// Returns the first declared tier granting `capability`, for the
    /// `FeatureUnavailable` caller message.
    pub fn lowest_tier_granting(&self, capability: &CapabilityId) -> Option<&PlanTier> {
        self.plans.lowest_tier_granting(capability)
    }
}
