// src/sink/postgres.rs
//! Postgres repository over a bounded, lazily connected sqlx pool.
//!
//! One table, `news`, keyed by `id`. Upserts overwrite every column on
//! conflict. The table is created on first use.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::store::{NewsQuery, NewsRepository, QUERY_LIMIT};
use crate::error::StoreError;
use crate::model::{Entities, MarketImpact, NewsItem, Numbers, Sentiment};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS news (
    id                   TEXT PRIMARY KEY,
    source               TEXT NOT NULL,
    title                TEXT NOT NULL,
    url                  TEXT NOT NULL,
    published_at         TEXT NOT NULL,
    summary              TEXT,
    content              TEXT,
    categories           TEXT[] NOT NULL DEFAULT '{}',
    sentiment            TEXT NOT NULL,
    sentiment_confidence DOUBLE PRECISION NOT NULL,
    relevance            INTEGER NOT NULL,
    market_impact        TEXT NOT NULL,
    entities             JSONB NOT NULL,
    numbers              JSONB NOT NULL
)
"#;

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS news_published_at_idx ON news (published_at DESC)";

const UPSERT_SQL: &str = r#"
INSERT INTO news (
    id, source, title, url, published_at, summary, content,
    categories, sentiment, sentiment_confidence, relevance,
    market_impact, entities, numbers
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
ON CONFLICT (id) DO UPDATE SET
    source = EXCLUDED.source,
    title = EXCLUDED.title,
    url = EXCLUDED.url,
    published_at = EXCLUDED.published_at,
    summary = EXCLUDED.summary,
    content = EXCLUDED.content,
    categories = EXCLUDED.categories,
    sentiment = EXCLUDED.sentiment,
    sentiment_confidence = EXCLUDED.sentiment_confidence,
    relevance = EXCLUDED.relevance,
    market_impact = EXCLUDED.market_impact,
    entities = EXCLUDED.entities,
    numbers = EXCLUDED.numbers
"#;

const SELECT_SQL: &str = r#"
SELECT id, source, title, url, published_at, summary, content,
       categories, sentiment, sentiment_confidence, relevance,
       market_impact, entities, numbers
FROM news
WHERE 1=1"#;

#[derive(Debug)]
pub struct PgNewsRepository {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PgNewsRepository {
    /// Builds the pool without connecting; connections open on first use.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(0)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .map_err(|e| StoreError::Permanent(format!("invalid store url: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    /// Creates the table and index once per process. A failed attempt is
    /// retried on the next call.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
                sqlx::query(CREATE_INDEX_SQL).execute(&self.pool).await?;
                tracing::info!(target: "sink", "news table ready");
                Ok::<(), StoreError>(())
            })
            .await
            .map(|_| ())
    }
}

fn row_to_item(row: &PgRow) -> Result<NewsItem, StoreError> {
    let sentiment: String = row.try_get("sentiment")?;
    let impact: String = row.try_get("market_impact")?;
    let relevance: i32 = row.try_get("relevance")?;
    let categories: Vec<String> = row.try_get("categories")?;
    let Json(entities): Json<Entities> = row.try_get("entities")?;
    let Json(numbers): Json<Numbers> = row.try_get("numbers")?;

    let mut item = NewsItem {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        published_at: row.try_get("published_at")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        categories: categories.into_iter().collect(),
        sentiment: Sentiment::parse(&sentiment).unwrap_or_default(),
        sentiment_confidence: 0.0,
        relevance: 0,
        market_impact: MarketImpact::parse(&impact).unwrap_or_default(),
        entities,
        numbers,
    };
    item.set_sentiment_confidence(row.try_get("sentiment_confidence")?);
    item.set_relevance(relevance as i64);
    Ok(item)
}

#[async_trait]
impl NewsRepository for PgNewsRepository {
    async fn upsert(&self, item: &NewsItem) -> Result<(), StoreError> {
        self.ensure_schema().await?;
        let categories: Vec<String> = item.categories.iter().cloned().collect();
        sqlx::query(UPSERT_SQL)
            .bind(&item.id)
            .bind(&item.source)
            .bind(&item.title)
            .bind(&item.url)
            .bind(&item.published_at)
            .bind(&item.summary)
            .bind(&item.content)
            .bind(categories)
            .bind(item.sentiment.as_str())
            .bind(item.sentiment_confidence)
            .bind(item.relevance as i32)
            .bind(item.market_impact.as_str())
            .bind(Json(&item.entities))
            .bind(Json(&item.numbers))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError> {
        self.ensure_schema().await?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(SELECT_SQL);
        if let Some(cat) = &q.category {
            qb.push(" AND ").push_bind(cat.clone()).push(" = ANY(categories)");
        }
        if let Some(src) = &q.source {
            qb.push(" AND source = ").push_bind(src.clone());
        }
        if let Some(min) = q.min_relevance {
            qb.push(" AND relevance >= ").push_bind(min as i32);
        }
        qb.push(" ORDER BY published_at DESC LIMIT ")
            .push_bind(QUERY_LIMIT as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
