//! SQLite persistence for feed configurations and keyword rules.
//! Survives restarts; every trait call runs as a single statement or transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pullfeed_core::types::{apply_update, weekday_from_index};
use pullfeed_core::{
    ChannelId, DisplayFormat, FeedConfig, FeedStore, FeedUpdate, KeywordKind, KeywordRuleSet,
    PublisherId, PullFeedError, Result, RoleId, TenantId,
};
use rusqlite::{Connection, OptionalExtension, params};

const FEED_COLUMNS: &str =
    "tenant_id, publisher, channel_id, format, weekday, mention_role, pin, check_keywords";

fn store_err(context: &str) -> impl Fn(rusqlite::Error) -> PullFeedError + '_ {
    move |e| PullFeedError::Store(format!("{context}: {e}"))
}

/// Feed and keyword store.
pub struct FeedDb {
    conn: Mutex<Connection>,
}

impl FeedDb {
    /// Open or create the database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err("DB open"))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            -- One feed per (tenant, publisher)
            CREATE TABLE IF NOT EXISTS feeds (
                tenant_id INTEGER NOT NULL,
                publisher TEXT NOT NULL,         -- 'MARVEL', 'DC', ...
                channel_id INTEGER NOT NULL,
                format TEXT NOT NULL DEFAULT 'Summary',
                weekday INTEGER NOT NULL,        -- 0 = Monday
                mention_role INTEGER,
                pin INTEGER NOT NULL DEFAULT 0,
                check_keywords INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tenant_id, publisher)
            );

            -- Normalized keyword terms
            CREATE TABLE IF NOT EXISTS keywords (
                tenant_id INTEGER NOT NULL,
                kind INTEGER NOT NULL,           -- 0 = title, 1 = creator
                term TEXT NOT NULL,
                PRIMARY KEY (tenant_id, kind, term)
            );

            CREATE INDEX IF NOT EXISTS idx_feeds_weekday ON feeds(weekday);
         ",
            )
            .map_err(store_err("Migration"))
    }

    fn query_feeds(conn: &Connection, tenant: Option<TenantId>) -> Result<Vec<FeedConfig>> {
        let sql = match tenant {
            Some(_) => format!("SELECT {FEED_COLUMNS} FROM feeds WHERE tenant_id = ?1 ORDER BY publisher"),
            None => format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY tenant_id, publisher"),
        };
        let mut stmt = conn.prepare(&sql).map_err(store_err("List feeds"))?;
        let rows = match tenant {
            Some(t) => stmt.query_map([t.0 as i64], FeedRow::read),
            None => stmt.query_map([], FeedRow::read),
        }
        .map_err(store_err("List feeds"))?;

        let mut feeds = Vec::new();
        for row in rows {
            let row = row.map_err(store_err("List feeds"))?;
            match row.decode() {
                Ok(feed) => feeds.push(feed),
                Err(e) => tracing::warn!("⚠️ Skipping unreadable feed row: {e}"),
            }
        }
        Ok(feeds)
    }

    fn write_feed(conn: &Connection, feed: &FeedConfig) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE feeds SET channel_id = ?3, format = ?4, weekday = ?5, mention_role = ?6,
                pin = ?7, check_keywords = ?8
             WHERE tenant_id = ?1 AND publisher = ?2",
            params![
                feed.tenant.0 as i64,
                feed.publisher.as_str(),
                feed.channel.0 as i64,
                feed.format.as_str(),
                feed.weekday.num_days_from_monday(),
                feed.mention_role.map(|r| r.0 as i64),
                feed.pin as i32,
                feed.check_keywords as i32,
            ],
        )
    }
}

/// Raw column values of one `feeds` row.
struct FeedRow {
    tenant: i64,
    publisher: String,
    channel: i64,
    format: String,
    weekday: i64,
    mention_role: Option<i64>,
    pin: bool,
    check_keywords: bool,
}

impl FeedRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tenant: row.get(0)?,
            publisher: row.get(1)?,
            channel: row.get(2)?,
            format: row.get(3)?,
            weekday: row.get(4)?,
            mention_role: row.get(5)?,
            pin: row.get::<_, i32>(6)? != 0,
            check_keywords: row.get::<_, i32>(7)? != 0,
        })
    }

    fn decode(self) -> Result<FeedConfig> {
        let weekday = u8::try_from(self.weekday)
            .map_err(|_| PullFeedError::Store(format!("weekday {} out of range", self.weekday)))?;
        Ok(FeedConfig {
            tenant: TenantId(self.tenant as u64),
            publisher: self.publisher.parse::<PublisherId>()?,
            channel: ChannelId(self.channel as u64),
            format: self.format.parse::<DisplayFormat>()?,
            weekday: weekday_from_index(weekday)?,
            mention_role: self.mention_role.map(|r| RoleId(r as u64)),
            pin: self.pin,
            check_keywords: self.check_keywords,
        })
    }
}

#[async_trait]
impl FeedStore for FeedDb {
    async fn list_feeds(&self) -> Result<Vec<FeedConfig>> {
        Self::query_feeds(&self.conn(), None)
    }

    async fn list_tenant_feeds(&self, tenant: TenantId) -> Result<Vec<FeedConfig>> {
        Self::query_feeds(&self.conn(), Some(tenant))
    }

    async fn insert_feed(&self, feed: &FeedConfig) -> Result<()> {
        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO feeds ({FEED_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    feed.tenant.0 as i64,
                    feed.publisher.as_str(),
                    feed.channel.0 as i64,
                    feed.format.as_str(),
                    feed.weekday.num_days_from_monday(),
                    feed.mention_role.map(|r| r.0 as i64),
                    feed.pin as i32,
                    feed.check_keywords as i32,
                ],
            )
            .map_err(store_err("Insert feed"))?;
        if inserted == 0 {
            return Err(PullFeedError::FeedExists {
                tenant: feed.tenant,
                publisher: feed.publisher,
            });
        }
        Ok(())
    }

    async fn update_feed(
        &self,
        tenant: TenantId,
        publisher: PublisherId,
        updates: &[FeedUpdate],
    ) -> Result<FeedConfig> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(store_err("Update feed"))?;

        let row = tx
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE tenant_id = ?1 AND publisher = ?2"),
                params![tenant.0 as i64, publisher.as_str()],
                FeedRow::read,
            )
            .optional()
            .map_err(store_err("Update feed"))?
            .ok_or(PullFeedError::ConfigNotFound { tenant, publisher })?;

        let mut feed = row.decode()?;
        apply_update(&mut feed, updates);
        Self::write_feed(&tx, &feed).map_err(store_err("Update feed"))?;
        tx.commit().map_err(store_err("Update feed"))?;
        Ok(feed)
    }

    async fn delete_feed(&self, tenant: TenantId, publisher: PublisherId) -> Result<bool> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM feeds WHERE tenant_id = ?1 AND publisher = ?2",
                params![tenant.0 as i64, publisher.as_str()],
            )
            .map_err(store_err("Delete feed"))?;
        Ok(removed > 0)
    }

    async fn keyword_rules(&self, tenant: TenantId) -> Result<KeywordRuleSet> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT kind, term FROM keywords WHERE tenant_id = ?1")
            .map_err(store_err("Load keywords"))?;
        let rows = stmt
            .query_map([tenant.0 as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err("Load keywords"))?;

        let mut rules = KeywordRuleSet::default();
        for row in rows {
            let (kind, term) = row.map_err(store_err("Load keywords"))?;
            match KeywordKind::from_code(kind) {
                Some(kind) => {
                    rules.add(kind, &term);
                }
                None => tracing::warn!("⚠️ Unknown keyword kind {kind} for tenant {tenant}"),
            }
        }
        Ok(rules)
    }

    async fn add_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str) -> Result<bool> {
        let term = KeywordRuleSet::normalize(term);
        if term.is_empty() {
            return Ok(false);
        }
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO keywords (tenant_id, kind, term) VALUES (?1, ?2, ?3)",
                params![tenant.0 as i64, kind.code(), term],
            )
            .map_err(store_err("Add keyword"))?;
        Ok(inserted > 0)
    }

    async fn remove_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM keywords WHERE tenant_id = ?1 AND kind = ?2 AND term = ?3",
                params![tenant.0 as i64, kind.code(), KeywordRuleSet::normalize(term)],
            )
            .map_err(store_err("Remove keyword"))?;
        Ok(removed > 0)
    }

    async fn delete_tenant(&self, tenant: TenantId) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(store_err("Delete tenant"))?;
        let feeds = tx
            .execute("DELETE FROM feeds WHERE tenant_id = ?1", [tenant.0 as i64])
            .map_err(store_err("Delete tenant"))?;
        tx.execute("DELETE FROM keywords WHERE tenant_id = ?1", [tenant.0 as i64])
            .map_err(store_err("Delete tenant"))?;
        tx.commit().map_err(store_err("Delete tenant"))?;
        Ok(feeds)
    }
}
