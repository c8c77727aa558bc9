//! TTL-bounded model-catalog cache.
//!
//! Backend `list_models()` calls can hit a remote endpoint (Ollama's
//! `/api/tags`) or just return a hardcoded static list (OpenAI, Anthropic,
//! Cohere). Either way callers — the Router's model-based selection, a
//! future admin surface — shouldn't refetch on every call. `moka`'s
//! `try_get_with` gives per-key TTL expiry and in-flight de-duplication, so
//! a concurrent burst of `list_models` calls for the same backend triggers
//! exactly one upstream fetch; every other waiter shares that fetch's
//! result instead of racing it.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::backends::{BackendAdapter, ModelListResult};
use crate::error::{GatewayError, GatewayResult};

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// `try_get_with` hands back the failing init future's error wrapped in an
/// `Arc`, shared across every waiter on that key; `GatewayError` carries a
/// non-`Clone` `cause`, so this reconstructs an equivalent error without it.
fn clone_error(err: &GatewayError) -> GatewayError {
    GatewayError::new(err.code, err.message.clone())
        .with_provenance(err.provenance.clone())
        .with_retryable(err.is_retryable)
}

/// Caches [`ModelListResult`]s per backend name with a TTL, so repeated
/// catalog lookups don't repeatedly hit the provider (or re-walk a static
/// list needlessly).
#[derive(Clone)]
pub struct ModelCatalog {
    cache: Cache<String, Arc<ModelListResult>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Returns the cached catalog for `backend_name` if still fresh,
    /// otherwise calls `backend.list_models()` once. Concurrent callers
    /// racing on the same key share that single in-flight fetch instead of
    /// each triggering their own.
    pub async fn get_or_fetch(
        &self,
        backend_name: &str,
        backend: &dyn BackendAdapter,
    ) -> GatewayResult<Arc<ModelListResult>> {
        self.cache
            .try_get_with(backend_name.to_string(), async {
                backend.list_models().await.map(Arc::new)
            })
            .await
            .map_err(|e| clone_error(&e))
    }

    /// Evicts a single backend's cached catalog, forcing the next lookup to
    /// refetch. Used when a backend's model list is known to have changed.
    pub async fn invalidate(&self, backend_name: &str) {
        self.cache.invalidate(backend_name).await;
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ModelSource;
    use crate::ir::{Capabilities, Request, Response, SystemMessageStrategy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct CountingBackend {
        calls: AtomicU32,
        capabilities: Capabilities,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                capabilities: Capabilities::minimal(SystemMessageStrategy::InMessages),
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }

        async fn execute(&self, _request: Request) -> GatewayResult<Response> {
            unreachable!("not exercised by this test")
        }

        async fn list_models(&self) -> GatewayResult<ModelListResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ModelListResult {
                models: Vec::new(),
                source: ModelSource::Static,
                fetched_at: chrono::Utc::now(),
                is_complete: true,
            })
        }
    }

    #[tokio::test]
    async fn caches_repeated_lookups_within_ttl() {
        let catalog = ModelCatalog::with_ttl(Duration::from_secs(60));
        let backend = CountingBackend::new();

        catalog.get_or_fetch("counting", &backend).await.unwrap();
        catalog.get_or_fetch("counting", &backend).await.unwrap();
        catalog.get_or_fetch("counting", &backend).await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let catalog = ModelCatalog::with_ttl(Duration::from_secs(60));
        let backend = CountingBackend::new();

        catalog.get_or_fetch("counting", &backend).await.unwrap();
        catalog.invalidate("counting").await;
        catalog.get_or_fetch("counting", &backend).await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[derive(Debug)]
    struct SlowBackend {
        calls: AtomicU32,
        capabilities: Capabilities,
    }

    impl SlowBackend {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                capabilities: Capabilities::minimal(SystemMessageStrategy::InMessages),
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }

        async fn execute(&self, _request: Request) -> GatewayResult<Response> {
            unreachable!("not exercised by this test")
        }

        async fn list_models(&self) -> GatewayResult<ModelListResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ModelListResult {
                models: Vec::new(),
                source: ModelSource::Remote,
                fetched_at: chrono::Utc::now(),
                is_complete: true,
            })
        }
    }

    #[tokio::test]
    async fn concurrent_misses_on_the_same_key_share_one_fetch() {
        let catalog = ModelCatalog::with_ttl(Duration::from_secs(60));
        let backend = SlowBackend::new();

        let (a, b, c) = tokio::join!(
            catalog.get_or_fetch("slow", &backend),
            catalog.get_or_fetch("slow", &backend),
            catalog.get_or_fetch("slow", &backend),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
