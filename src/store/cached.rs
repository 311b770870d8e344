//! Time-boxed memoization of whole-table reads.
//!
//! Any write drops every cached table, not just the written one. A read
//! that overlaps a write returns its result but does not cache it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DatabaseError;
use crate::store::traits::{SheetBackend, Table};

struct Entry {
    fetched_at: Instant,
    table: Table,
}

/// Read-through cache in front of another backend.
pub struct CachedBackend {
    inner: Arc<dyn SheetBackend>,
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
    /// Bumped by every write.
    generation: AtomicU64,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn SheetBackend>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Drop all cached tables.
    pub async fn invalidate(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl SheetBackend for CachedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError> {
        if !self.ttl.is_zero() {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(sheet) {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!(sheet, "Sheet cache hit");
                    return Ok(entry.table.clone());
                }
            }
        }

        let started = self.generation.load(Ordering::SeqCst);
        let table = self.inner.read_table(sheet).await?;
        if !self.ttl.is_zero() {
            let mut entries = self.entries.write().await;
            if self.generation.load(Ordering::SeqCst) == started {
                entries.insert(
                    sheet.to_string(),
                    Entry {
                        fetched_at: Instant::now(),
                        table: table.clone(),
                    },
                );
            } else {
                debug!(sheet, "Write overlapped read, not caching");
            }
        }
        Ok(table)
    }

    async fn read_table_fresh(&self, sheet: &str) -> Result<Table, DatabaseError> {
        self.inner.read_table_fresh(sheet).await
    }

    async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError> {
        let result = self.inner.write_table(sheet, table).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Invalidate even on failure: a half-applied remote write leaves the
        // cached copy stale either way.
        self.invalidate().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use super::*;
    use crate::store::LibSqlBackend;

    /// Counts reads that reach the underlying store.
    struct Counting {
        inner: LibSqlBackend,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl SheetBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_table(sheet).await
        }
        async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError> {
            self.inner.write_table(sheet, table).await
        }
    }

    async fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            reads: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn repeated_reads_hit_cache() {
        let inner = counting().await;
        let cache = CachedBackend::new(inner.clone(), Duration::from_secs(60));

        cache.read_table("notes").await.unwrap();
        cache.read_table("notes").await.unwrap();
        cache.read_table("notes").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_invalidates_every_table() {
        let inner = counting().await;
        let cache = CachedBackend::new(inner.clone(), Duration::from_secs(60));

        cache.read_table("notes").await.unwrap();
        cache.read_table("config").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);

        let mut t = Table::new(["내용"]);
        t.push_record(&[("내용", "new".into())]);
        cache.write_table("chats", &t).await.unwrap();

        cache.read_table("notes").await.unwrap();
        cache.read_table("config").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn read_after_write_sees_new_rows() {
        let inner = counting().await;
        let cache = CachedBackend::new(inner, Duration::from_secs(60));
        assert!(cache.read_table("notes").await.unwrap().is_uninitialized());

        let mut t = Table::new(["내용"]);
        t.push_record(&[("내용", "fresh".into())]);
        cache.write_table("notes", &t).await.unwrap();

        assert_eq!(cache.read_table("notes").await.unwrap().cell(0, "내용"), "fresh");
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let inner = counting().await;
        let cache = CachedBackend::new(inner.clone(), Duration::ZERO);
        cache.read_table("notes").await.unwrap();
        cache.read_table("notes").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let inner = counting().await;
        let cache = CachedBackend::new(inner.clone(), Duration::from_millis(50));

        cache.read_table("notes").await.unwrap();
        cache.read_table("notes").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.read_table("notes").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fresh_read_skips_cache() {
        let inner = counting().await;
        let cache = CachedBackend::new(inner.clone(), Duration::from_secs(60));

        cache.read_table("notes").await.unwrap();
        cache.read_table_fresh("notes").await.unwrap();
        cache.read_table_fresh("notes").await.unwrap();
        assert_eq!(inner.reads.load(Ordering::SeqCst), 3);
    }

    /// Holds the next read's result for a while before returning it.
    struct SlowRead {
        inner: LibSqlBackend,
        delay_next: AtomicBool,
    }

    #[async_trait]
    impl SheetBackend for SlowRead {
        fn name(&self) -> &str {
            "slow"
        }
        async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError> {
            let table = self.inner.read_table(sheet).await?;
            if self.delay_next.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(table)
        }
        async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError> {
            self.inner.write_table(sheet, table).await
        }
    }

    #[tokio::test]
    async fn read_overlapping_write_is_not_cached() {
        let inner = Arc::new(SlowRead {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            delay_next: AtomicBool::new(false),
        });
        let cache = Arc::new(CachedBackend::new(inner.clone(), Duration::from_secs(60)));

        let mut old = Table::new(["내용"]);
        old.push_record(&[("내용", "old".into())]);
        cache.write_table("notes", &old).await.unwrap();

        inner.delay_next.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.read_table("notes").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut new = old.clone();
        new.push_record(&[("내용", "new".into())]);
        cache.write_table("notes", &new).await.unwrap();

        let in_flight = reader.await.unwrap().unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(cache.read_table("notes").await.unwrap().len(), 2);
    }
}
