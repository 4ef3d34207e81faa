use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::providers::{call_structured, ProviderError, ProviderRequest, StructuredProvider, Validate};

/// The first provider in a chain gets this many attempts; the others get one.
pub const PRIMARY_ATTEMPTS: usize = 2;

/// A validated reply plus where in the chain it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSuccess<T> {
    pub value: T,
    /// Index into the chain. 0 is the primary.
    pub position: usize,
    pub provider_id: String,
}

/// Walk `chain` in order until one provider returns a valid `T`. Each
/// attempt's error is logged and dropped; only exhaustion is reported.
pub async fn try_in_order<T>(
    label: &str,
    chain: &[Arc<dyn StructuredProvider>],
    request: &ProviderRequest,
) -> Result<ChainSuccess<T>, ProviderError>
where
    T: DeserializeOwned + Validate,
{
    let mut attempts = 0;

    for (position, provider) in chain.iter().enumerate() {
        let tries = if position == 0 { PRIMARY_ATTEMPTS } else { 1 };
        for attempt in 1..=tries {
            attempts += 1;
            match call_structured::<T>(provider.as_ref(), request).await {
                Ok(value) => {
                    debug!(unit = label, provider = provider.id(), attempt, "Provider succeeded");
                    return Ok(ChainSuccess {
                        value,
                        position,
                        provider_id: provider.id().to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        unit = label,
                        provider = provider.id(),
                        attempt,
                        error = %e,
                        "Provider attempt failed"
                    );
                }
            }
        }
    }

    Err(ProviderError::ProvidersExhausted { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        n: u32,
    }

    impl Validate for Reply {
        fn validate(&self) -> Result<(), String> {
            Ok(())
        }
    }

    struct Scripted {
        id: String,
        fail_first: usize,
        calls: AtomicUsize,
        reply: u32,
    }

    impl Scripted {
        fn new(id: &str, fail_first: usize, reply: u32) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail_first,
                calls: AtomicUsize::new(0),
                reply,
            })
        }
    }

    #[async_trait]
    impl StructuredProvider for Scripted {
        fn id(&self) -> &str {
            &self.id
        }

        async fn call(&self, _: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ProviderError::Http {
                    status: 503,
                    body: "overloaded".into(),
                })
            } else {
                Ok(serde_json::json!({ "n": self.reply }))
            }
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            schema_name: "reply".into(),
            system: String::new(),
            user: String::new(),
            schema: serde_json::json!({}),
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_primary_gets_a_second_attempt() {
        let primary = Scripted::new("p", 1, 1);
        let secondary = Scripted::new("s", 0, 2);
        let chain: Vec<Arc<dyn StructuredProvider>> = vec![primary.clone(), secondary.clone()];

        let ok = try_in_order::<Reply>("t", &chain, &request()).await.unwrap();
        assert_eq!(ok.value, Reply { n: 1 });
        assert_eq!(ok.position, 0);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_secondary() {
        let primary = Scripted::new("p", 10, 1);
        let secondary = Scripted::new("s", 0, 2);
        let chain: Vec<Arc<dyn StructuredProvider>> = vec![primary.clone(), secondary];

        let ok = try_in_order::<Reply>("t", &chain, &request()).await.unwrap();
        assert_eq!(ok.value, Reply { n: 2 });
        assert_eq!(ok.position, 1);
        assert_eq!(ok.provider_id, "s");
        assert_eq!(primary.calls.load(Ordering::SeqCst), PRIMARY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_exhaustion_counts_attempts() {
        let chain: Vec<Arc<dyn StructuredProvider>> =
            vec![Scripted::new("p", 10, 1), Scripted::new("s", 10, 2)];
        let err = try_in_order::<Reply>("t", &chain, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ProvidersExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let err = try_in_order::<Reply>("t", &[], &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ProvidersExhausted { attempts: 0 }));
    }
}
