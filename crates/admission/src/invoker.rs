//! Upstream invocation with overload backoff and error normalisation.
//!
//! The invoker wraps exactly one [`UpstreamClient::call`] per admitted
//! request. The distinguished overload condition triggers a fixed cooldown
//! followed by exactly one automatic retry; the retry is invisible to the
//! stage chain and never re-runs authorization. Every other failure is
//! surfaced on first occurrence with the upstream payload untouched.
//!
//! The batch-size ceiling also lives here: it is a policy about the remote
//! API's documented limits, not a transport concern, so the router never
//! sees it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::errors::AdmissionError;
use crate::ports::UpstreamClient;
use crate::types::{Credential, OperationDescriptor};

/// Invocation policy for the upstream client.
#[derive(Debug, Clone)]
pub struct InvokerPolicy {
    /// How long to wait after an overload signal before the single retry.
    pub overload_cooldown: Duration,
    /// Maximum item count accepted for batch-shaped operations.
    pub max_batch_items: usize,
}

impl Default for InvokerPolicy {
    fn default() -> Self {
        Self {
            overload_cooldown: Duration::from_secs(30),
            max_batch_items: 10,
        }
    }
}

/// Wraps the abstract upstream client with backoff-on-overload retry and
/// error normalisation.
pub struct UpstreamInvoker {
    client: Arc<dyn UpstreamClient>,
    policy: InvokerPolicy,
}

impl UpstreamInvoker {
    /// Creates an invoker over `client` with the given policy.
    pub fn new(client: Arc<dyn UpstreamClient>, policy: InvokerPolicy) -> Self {
        Self { client, policy }
    }

    /// Performs the upstream call for an admitted request.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if a batch-shaped payload exceeds the item ceiling
    ///   (rejected locally; the upstream is never contacted).
    /// - `UpstreamError` for any upstream failure, including an overload
    ///   that persisted through the single automatic retry.
    pub async fn invoke(
        &self,
        descriptor: &OperationDescriptor,
        payload: &Value,
        credential: &Credential,
    ) -> Result<Value, AdmissionError> {
        if descriptor.batch {
            let items = batch_item_count(payload);
            if items > self.policy.max_batch_items {
                return Err(AdmissionError::InvalidRequest {
                    message: format!(
                        "batch of {items} items exceeds the upstream ceiling of {}",
                        self.policy.max_batch_items
                    ),
                });
            }
        }

        tracing::debug!(operation = %descriptor.name, "dispatching upstream call");
        match self.client.call(&descriptor.name, payload, credential).await {
            Ok(result) => Ok(result),
            Err(failure) if failure.is_overload() => {
                tracing::info!(
                    operation = %descriptor.name,
                    cooldown_secs = self.policy.overload_cooldown.as_secs(),
                    "upstream overloaded; retrying once after cooldown"
                );
                tokio::time::sleep(self.policy.overload_cooldown).await;
                self.client
                    .call(&descriptor.name, payload, credential)
                    .await
                    .map_err(|failure| AdmissionError::Upstream { failure })
            }
            Err(failure) => Err(AdmissionError::Upstream { failure }),
        }
    }
}

/// Counts the items a batch-shaped payload carries.
///
/// A top-level array is the batch itself; an object carries its batch in a
/// `records` array. Anything else counts as a single item.
fn batch_item_count(payload: &Value) -> usize {
    match payload {
        Value::Array(items) => items.len(),
        Value::Object(fields) => fields
            .get("records")
            .and_then(Value::as_array)
            .map_or(1, Vec::len),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::identifiers::{CapabilityId, OperationName};
    use crate::ports::{UpstreamFailure, UpstreamFailureKind};

    /// Upstream stub that fails with overload for the first `overloads`
    /// calls, then succeeds.
    struct OverloadingUpstream {
        overloads: usize,
        calls: AtomicUsize,
    }

    impl OverloadingUpstream {
        fn new(overloads: usize) -> Self {
            Self {
                overloads,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UpstreamClient for OverloadingUpstream {
        async fn call(
            &self,
            _operation: &OperationName,
            _payload: &Value,
            _credential: &Credential,
        ) -> Result<Value, UpstreamFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.overloads {
                Err(UpstreamFailure::overloaded(Value::Null))
            } else {
                Ok(json!({"id": "rec_1"}))
            }
        }
    }

    /// Upstream stub that always fails with a fixed non-overload failure.
    struct FailingUpstream {
        kind: UpstreamFailureKind,
        status: u16,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UpstreamClient for FailingUpstream {
        async fn call(
            &self,
            _operation: &OperationName,
            _payload: &Value,
            _credential: &Credential,
        ) -> Result<Value, UpstreamFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamFailure::new(
                self.kind,
                Some(self.status),
                json!({"error": "upstream detail"}),
            ))
        }
    }

    fn descriptor(batch: bool) -> OperationDescriptor {
        OperationDescriptor {
            name: OperationName::new("records.create").unwrap(),
            required_capability: CapabilityId::new("records:write").unwrap(),
            required_scopes: Default::default(),
            destructive: false,
            batch,
        }
    }

    fn credential() -> Credential {
        Credential::new("tok_test").unwrap()
    }

    fn invoker(client: Arc<dyn UpstreamClient>) -> UpstreamInvoker {
        UpstreamInvoker::new(
            client,
            InvokerPolicy {
                overload_cooldown: Duration::from_secs(30),
                max_batch_items: 10,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn single_overload_is_retried_once_and_succeeds() {
        let upstream = Arc::new(OverloadingUpstream::new(1));
        let invoker = invoker(Arc::clone(&upstream) as Arc<dyn UpstreamClient>);

        let result = invoker
            .invoke(&descriptor(false), &json!({}), &credential())
            .await
            .unwrap();

        assert_eq!(result, json!({"id": "rec_1"}));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_overload_surfaces_after_exactly_one_retry() {
        let upstream = Arc::new(OverloadingUpstream::new(usize::MAX));
        let invoker = invoker(Arc::clone(&upstream) as Arc<dyn UpstreamClient>);

        let error = invoker
            .invoke(&descriptor(false), &json!({}), &credential())
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::UpstreamError);
        // Never a second retry.
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_overload_failures_propagate_without_retry() {
        let upstream = Arc::new(FailingUpstream {
            kind: UpstreamFailureKind::Validation,
            status: 422,
            calls: AtomicUsize::new(0),
        });
        let invoker = invoker(Arc::clone(&upstream) as Arc<dyn UpstreamClient>);

        let error = invoker
            .invoke(&descriptor(false), &json!({}), &credential())
            .await
            .unwrap_err();

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        match error {
            AdmissionError::Upstream { failure } => {
                assert_eq!(failure.status, Some(422));
                assert_eq!(failure.kind, UpstreamFailureKind::Validation);
                // Payload passes through unmodified.
                assert_eq!(failure.detail, json!({"error": "upstream detail"}));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_before_dispatch() {
        let upstream = Arc::new(OverloadingUpstream::new(0));
        let invoker = invoker(Arc::clone(&upstream) as Arc<dyn UpstreamClient>);
        let payload = json!({"records": (0..11).map(|i| json!({"n": i})).collect::<Vec<_>>()});

        let error = invoker
            .invoke(&descriptor(true), &payload, &credential())
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn batch_at_the_ceiling_is_dispatched() {
        let upstream = Arc::new(OverloadingUpstream::new(0));
        let invoker = invoker(Arc::clone(&upstream) as Arc<dyn UpstreamClient>);
        let payload = json!({"records": (0..10).map(|i| json!({"n": i})).collect::<Vec<_>>()});

        invoker
            .invoke(&descriptor(true), &payload, &credential())
            .await
            .unwrap();
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_item_count_reads_arrays_and_records_fields() {
        assert_eq!(batch_item_count(&json!([1, 2, 3])), 3);
        assert_eq!(batch_item_count(&json!({"records": [1, 2]})), 2);
        assert_eq!(batch_item_count(&json!({"fields": {}})), 1);
        assert_eq!(batch_item_count(&json!("opaque")), 1);
    }
}
