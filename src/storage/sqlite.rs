use crate::analytics::EnrichedClick;
use crate::models::{Link, LinkUpdate, NewLink};
use crate::storage::{ClickSink, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Number of recorded clicks for a link
    pub async fn count_clicks(&self, link_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clicks WHERE link_id = ?")
            .bind(link_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL,
                domain TEXT NOT NULL,
                destination TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (domain, slug)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES links(id),
                clicked_at INTEGER NOT NULL,
                ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                referer TEXT NOT NULL,
                referer_domain TEXT NOT NULL,
                country TEXT NOT NULL,
                city TEXT NOT NULL,
                region TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                browser TEXT NOT NULL,
                browser_version TEXT NOT NULL,
                os TEXT NOT NULL,
                device_type TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_link_id ON clicks(link_id, clicked_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn create_link(&self, link: &NewLink) -> StorageResult<Link> {
        let now = chrono::Utc::now().timestamp();
        let domain = link.domain.to_lowercase();

        let result = sqlx::query(
            r#"
            INSERT INTO links (slug, domain, destination, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(domain, slug) DO NOTHING
            "#,
        )
        .bind(&link.slug)
        .bind(&domain)
        .bind(&link.destination)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| StorageError::Other(anyhow::anyhow!("created link vanished")))
    }

    async fn get_by_key(&self, domain: &str, slug: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            r#"
            SELECT id, slug, domain, destination, is_active, created_at, updated_at
            FROM links
            WHERE domain = ? AND slug = ?
            "#,
        )
        .bind(domain.to_lowercase())
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            r#"
            SELECT id, slug, domain, destination, is_active, created_at, updated_at
            FROM links
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn update_link(&self, id: i64, update: &LinkUpdate) -> StorageResult<Option<Link>> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE links
            SET slug = ?, domain = ?, destination = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.slug)
        .bind(update.domain.to_lowercase())
        .bind(&update.destination)
        .bind(now)
        .bind(id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                StorageError::Other(e.into())
            }
        })?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(self.get_by_id(id).await?)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE links
            SET is_active = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ClickSink for SqliteStorage {
    async fn insert_clicks(&self, clicks: &[EnrichedClick]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for click in clicks {
            sqlx::query(
                r#"
                INSERT INTO clicks (
                    link_id, clicked_at, ip, user_agent, referer, referer_domain,
                    country, city, region, latitude, longitude,
                    browser, browser_version, os, device_type
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(click.link_id)
            .bind(click.clicked_at)
            .bind(&click.ip)
            .bind(&click.user_agent)
            .bind(&click.referer)
            .bind(&click.referer_domain)
            .bind(&click.geo.country)
            .bind(&click.geo.city)
            .bind(&click.geo.region)
            .bind(click.geo.latitude)
            .bind(click.geo.longitude)
            .bind(&click.browser)
            .bind(&click.browser_version)
            .bind(&click.os)
            .bind(click.device_type.as_str())
            .execute(&mut *tx)
            .await?;
        }

        // Dropping the transaction without commit rolls everything back
        tx.commit().await?;
        Ok(())
    }
}
