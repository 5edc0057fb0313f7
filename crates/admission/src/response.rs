//! Translation of terminal outcomes to the wire response contract.
//!
//! Every pass through the pipeline — success, stage rejection, or invoker
//! failure — ends as one [`GatewayResponse`]:
//!
//! ```json
//! { "ok": true,  "data": { ... } }
//! { "ok": false, "error": { "kind": "...", "message": "...", "detail": { ... } } }
//! ```
//!
//! Translation is total (every [`AdmissionError`] variant has exactly one
//! kind) and lossless for caller-relevant detail: remaining window for rate
//! limits, lowest granting tier for plan gaps, missing scopes, and the
//! untouched upstream payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{AdmissionError, ErrorKind};

/// The error half of the response contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Taxonomy classification, serialised as `snake_case`.
    pub kind: ErrorKind,
    /// Human-readable description, safe for caller display.
    pub message: String,
    /// Kind-specific structured detail, when the kind carries any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// The single response shape returned to the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// `true` exactly when the upstream call completed successfully.
    pub ok: bool,
    /// The upstream result, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The translated error, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl GatewayResponse {
    /// Builds the success shape around an upstream result.
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Translates a terminal error into the failure shape.
    pub fn failure(error: &AdmissionError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ResponseError {
                kind: error.kind(),
                message: error.to_string(),
                detail: detail_for(error),
            }),
        }
    }
}

impl From<Result<Value, AdmissionError>> for GatewayResponse {
    fn from(result: Result<Value, AdmissionError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(&error),
        }
    }
}

/// Builds the kind-specific detail object for an error, if the kind has one.
fn detail_for(error: &AdmissionError) -> Option<Value> {
    match error {
        AdmissionError::FeatureUnavailable {
            capability,
            required_plan,
        } => Some(json!({
            "capability": capability,
            "required_plan": required_plan,
        })),
        AdmissionError::InsufficientPermissions { missing_scopes } => Some(json!({
            "missing_scopes": missing_scopes,
        })),
        AdmissionError::RateLimited { scope, retry_after } => Some(json!({
            "scope": scope,
            "retry_after_ms": retry_after.as_millis() as u64,
        })),
        AdmissionError::Upstream { failure } => Some(json!({
            "status": failure.status,
            "upstream_kind": failure.kind,
            "detail": failure.detail,
        })),
        AdmissionError::Unauthenticated { .. }
        | AdmissionError::ConfirmationRequired { .. }
        | AdmissionError::InvalidRequest { .. }
        | AdmissionError::Configuration { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::identifiers::{CapabilityId, PlanTier, Scope};
    use crate::limiter::LimiterScope;
    use crate::ports::{UpstreamFailure, UpstreamFailureKind};

    #[test]
    fn success_shape_carries_the_upstream_result() {
        let response = GatewayResponse::success(json!({"records": []}));
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire, json!({"ok": true, "data": {"records": []}}));
    }

    #[test]
    fn rate_limited_detail_reports_delay_and_partition() {
        let error = AdmissionError::RateLimited {
            scope: LimiterScope::Credential,
            retry_after: Duration::from_millis(750),
        };
        let response = GatewayResponse::failure(&error);
        let wire = serde_json::to_value(&response).unwrap();

        assert_eq!(wire["ok"], json!(false));
        assert_eq!(wire["error"]["kind"], json!("rate_limited"));
        assert_eq!(wire["error"]["detail"]["retry_after_ms"], json!(750));
        assert_eq!(wire["error"]["detail"]["scope"], json!("credential"));
    }

    #[test]
    fn feature_unavailable_detail_names_the_required_plan() {
        let error = AdmissionError::FeatureUnavailable {
            capability: CapabilityId::new("schema:modify").unwrap(),
            required_plan: Some(PlanTier::new("enterprise").unwrap()),
        };
        let wire = serde_json::to_value(GatewayResponse::failure(&error)).unwrap();
        assert_eq!(wire["error"]["detail"]["required_plan"], json!("enterprise"));
        assert_eq!(wire["error"]["detail"]["capability"], json!("schema:modify"));
    }

    #[test]
    fn insufficient_permissions_detail_lists_missing_scopes() {
        let error = AdmissionError::InsufficientPermissions {
            missing_scopes: vec![Scope::new("data:write").unwrap()],
        };
        let wire = serde_json::to_value(GatewayResponse::failure(&error)).unwrap();
        assert_eq!(wire["error"]["detail"]["missing_scopes"], json!(["data:write"]));
    }

    #[test]
    fn upstream_detail_passes_the_payload_through() {
        let error = AdmissionError::Upstream {
            failure: UpstreamFailure::new(
                UpstreamFailureKind::Validation,
                Some(422),
                json!({"type": "INVALID_VALUE", "message": "bad field"}),
            ),
        };
        let wire = serde_json::to_value(GatewayResponse::failure(&error)).unwrap();
        assert_eq!(wire["error"]["kind"], json!("upstream_error"));
        assert_eq!(wire["error"]["detail"]["status"], json!(422));
        assert_eq!(wire["error"]["detail"]["upstream_kind"], json!("validation"));
        assert_eq!(
            wire["error"]["detail"]["detail"],
            json!({"type": "INVALID_VALUE", "message": "bad field"})
        );
    }

    #[test]
    fn kinds_without_detail_omit_the_field() {
        let error = AdmissionError::Unauthenticated {
            reason: "missing credential".into(),
        };
        let wire = serde_json::to_value(GatewayResponse::failure(&error)).unwrap();
        assert_eq!(wire["error"].get("detail"), None);
        assert_eq!(wire["error"]["kind"], json!("unauthenticated"));
    }
}
