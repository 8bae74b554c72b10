// src/sink/memory.rs
//! In-process repository. Same upsert semantics as Postgres; used by tests
//! and by `STORE_BACKEND=memory` runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::store::{NewsQuery, NewsRepository, QUERY_LIMIT};
use crate::error::StoreError;
use crate::model::NewsItem;

#[derive(Debug, Default)]
pub struct MemoryNewsRepository {
    rows: RwLock<HashMap<String, NewsItem>>,
}

impl MemoryNewsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<NewsItem> {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).get(id).cloned()
    }
}

#[async_trait]
impl NewsRepository for MemoryNewsRepository {
    async fn upsert(&self, item: &NewsItem) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Permanent("repo rwlock poisoned".into()))?;
        rows.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn query(&self, q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Permanent("repo rwlock poisoned".into()))?;
        let mut out: Vec<NewsItem> = rows.values().filter(|it| q.matches(it)).cloned().collect();
        out.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.id.cmp(&b.id)));
        out.truncate(QUERY_LIMIT);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_overwrites_whole_row() {
        let repo = MemoryNewsRepository::new();
        let first = NewsItem::new("n1", "CNBC", "first")
            .with_summary("old")
            .with_categories(["markets"]);
        let second = NewsItem::new("n1", "Bloomberg", "second");

        repo.upsert(&first).await.unwrap();
        repo.upsert(&second).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("n1"), Some(second));
    }

    #[tokio::test]
    async fn query_orders_newest_first_and_caps() {
        let repo = MemoryNewsRepository::new();
        for i in 0..250 {
            let it = NewsItem::new(format!("n{i}"), "s", "t")
                .with_published_at(format!("2025-01-01T00:{:02}:{:02}Z", i / 60, i % 60));
            repo.upsert(&it).await.unwrap();
        }
        let out = repo.query(&NewsQuery::default()).await.unwrap();
        assert_eq!(out.len(), QUERY_LIMIT);
        assert_eq!(out[0].id, "n249");
        assert!(out.windows(2).all(|w| w[0].published_at >= w[1].published_at));
    }
}
