//! Process-wide cache of discovered tool schemas.
//!
//! Readers take an `Arc<[ToolSchema]>` snapshot and never block on a
//! refresh. Population is single-writer: concurrent misses wait on the
//! refresh mutex and reuse whatever the first writer stored.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use railchat_core::{RpcError, ToolHost, ToolSchema};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct SchemaCache {
    snapshot: RwLock<Option<Arc<[ToolSchema]>>>,
    refresh: Mutex<()>,
    /// Tool names treated as idempotent regardless of server annotations
    idempotent_tools: HashSet<String>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl SchemaCache {
    pub fn new(idempotent_tools: impl IntoIterator<Item = String>) -> Self {
        Self {
            snapshot: RwLock::new(None),
            refresh: Mutex::new(()),
            idempotent_tools: idempotent_tools.into_iter().collect(),
        }
    }

    /// The current schemas, if populated.
    pub fn snapshot(&self) -> Option<Arc<[ToolSchema]>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Return the cached schemas, discovering them through `host` on a miss.
    pub async fn get_or_populate(&self, host: &dyn ToolHost) -> Result<Arc<[ToolSchema]>, RpcError> {
        if let Some(schemas) = self.snapshot() {
            return Ok(schemas);
        }

        let _writer = self.refresh.lock().await;
        // Another writer may have finished while we waited.
        if let Some(schemas) = self.snapshot() {
            debug!("Schema cache populated by a concurrent request");
            return Ok(schemas);
        }
        self.populate(host).await
    }

    /// Drop the cached schemas; the next `get_or_populate` re-discovers.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = None;
        info!("Schema cache invalidated");
    }

    /// Re-discover unconditionally and swap in the result.
    ///
    /// Readers keep seeing the previous snapshot until discovery succeeds;
    /// on failure the previous snapshot stays in place.
    pub async fn refresh(&self, host: &dyn ToolHost) -> Result<Arc<[ToolSchema]>, RpcError> {
        let _writer = self.refresh.lock().await;
        self.populate(host).await.inspect_err(|e| {
            warn!(error = %e, "Schema refresh failed, keeping previous schemas");
        })
    }

    /// Swap in a new schema list.
    pub fn replace(&self, schemas: Vec<ToolSchema>) -> Arc<[ToolSchema]> {
        let schemas: Arc<[ToolSchema]> = schemas
            .into_iter()
            .map(|mut schema| {
                if self.idempotent_tools.contains(&schema.name) {
                    schema.idempotent = true;
                }
                schema
            })
            .collect();
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(schemas.clone());
        schemas
    }

    async fn populate(&self, host: &dyn ToolHost) -> Result<Arc<[ToolSchema]>, RpcError> {
        let discovered = host.discover_tools().await?;
        let schemas = self.replace(discovered);
        info!(count = schemas.len(), "Schema cache populated");
        Ok(schemas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use railchat_core::{RpcInvocation, ToolResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHost {
        discoveries: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingHost {
        fn new(fail: bool) -> Self {
            Self {
                discoveries: AtomicUsize::new(0),
                fail,
                delay: Duration::from_millis(10),
            }
        }

        fn slow(fail: bool, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(fail)
            }
        }
    }

    #[async_trait]
    impl ToolHost for CountingHost {
        async fn discover_tools(&self) -> Result<Vec<ToolSchema>, RpcError> {
            self.discoveries.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RpcError::transport("unreachable"));
            }
            Ok(vec![schema("SearchTrain"), schema("PNRStatus")])
        }

        async fn invoke(&self, call_id: &str, _invocation: RpcInvocation) -> ToolResult {
            ToolResult::success(call_id, "")
        }
    }

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object"}),
            idempotent: false,
        }
    }

    #[tokio::test]
    async fn populates_once_on_first_use() {
        let cache = SchemaCache::default();
        let host = CountingHost::new(false);
        assert!(cache.snapshot().is_none());

        let first = cache.get_or_populate(&host).await.unwrap();
        let second = cache.get_or_populate(&host).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(host.discoveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_discover_once() {
        let cache = Arc::new(SchemaCache::default());
        let host = Arc::new(CountingHost::new(false));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let host = host.clone();
                tokio::spawn(async move { cache.get_or_populate(host.as_ref()).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(host.discoveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_rediscovery() {
        let cache = SchemaCache::default();
        let host = CountingHost::new(false);
        cache.get_or_populate(&host).await.unwrap();
        cache.invalidate();
        assert!(cache.snapshot().is_none());
        cache.get_or_populate(&host).await.unwrap();
        assert_eq!(host.discoveries.load(Ordering::SeqCst), 2);

        cache.refresh(&host).await.unwrap();
        assert_eq!(host.discoveries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_discovery_leaves_cache_empty() {
        let cache = SchemaCache::default();
        let host = CountingHost::new(true);
        assert!(cache.get_or_populate(&host).await.is_err());
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn refresh_keeps_old_snapshot_until_swap() {
        let cache = Arc::new(SchemaCache::default());
        let before = cache.get_or_populate(&CountingHost::new(false)).await.unwrap();

        let refreshing = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let host = CountingHost::slow(true, Duration::from_millis(100));
                cache.refresh(&host).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let during = cache.snapshot().expect("snapshot visible during refresh");
        assert!(Arc::ptr_eq(&before, &during));

        assert!(refreshing.await.unwrap().is_err());
        let after = cache.snapshot().expect("snapshot kept after failed refresh");
        assert!(Arc::ptr_eq(&before, &after));

        // A good host still gets served from the kept schemas.
        let host = CountingHost::new(false);
        cache.get_or_populate(&host).await.unwrap();
        assert_eq!(host.discoveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_refresh_swaps_snapshot() {
        let cache = SchemaCache::default();
        let host = CountingHost::new(false);
        let before = cache.get_or_populate(&host).await.unwrap();
        let refreshed = cache.refresh(&host).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &refreshed));
        assert!(Arc::ptr_eq(&refreshed, &cache.snapshot().unwrap()));
    }

    #[test]
    fn replace_marks_configured_idempotent_tools() {
        let cache = SchemaCache::new(vec!["PNRStatus".to_string()]);
        let schemas = cache.replace(vec![schema("SearchTrain"), schema("PNRStatus")]);
        assert!(!schemas[0].idempotent);
        assert!(schemas[1].idempotent);
        assert_eq!(cache.snapshot().unwrap().len(), 2);
    }
}
