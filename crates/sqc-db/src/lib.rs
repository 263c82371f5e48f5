//! sqc-db
//!
//! Postgres backend for the item and cursor store contracts.
//!
//! Table names come from [`sqc_config::TableNames`] (validated as plain
//! identifiers) and are interpolated into the statements once, when the
//! store is built.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqc_config::TableNames;
use sqc_schemas::{Item, Seq, NO_CURSOR};
use sqc_store::{CasOutcome, CursorStore, ItemStore, SeqRange, SortOrder};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::debug;

pub const ENV_DB_URL: &str = "SQC_DATABASE_URL";

/// Connect to Postgres using SQC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Create the items and cursor tables if they do not exist.
pub async fn provision(pool: &PgPool, tables: &TableNames) -> Result<()> {
    tables.validate()?;

    sqlx::query(&format!(
        r#"
        create table if not exists {items} (
          queue_key     text        not null,
          seq           bigint      not null check (seq >= 0),
          payload       jsonb       not null,
          stored_at_utc timestamptz not null default now(),
          primary key (queue_key, seq)
        )
        "#,
        items = tables.items
    ))
    .execute(pool)
    .await
    .with_context(|| format!("create table {} failed", tables.items))?;

    sqlx::query(&format!(
        r#"
        create table if not exists {cursor} (
          queue_key      text        not null,
          seq            bigint      not null check (seq >= 0),
          written_at_utc timestamptz not null default now(),
          primary key (queue_key, seq)
        )
        "#,
        cursor = tables.cursor
    ))
    .execute(pool)
    .await
    .with_context(|| format!("create table {} failed", tables.cursor))?;

    debug!(items = %tables.items, cursor = %tables.cursor, "tables provisioned");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_items_table: bool,
    pub has_cursor_table: bool,
}

/// Connectivity + table presence.
pub async fn status(pool: &PgPool, tables: &TableNames) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_items_table: table_exists(pool, &tables.items).await?,
        has_cursor_table: table_exists(pool, &tables.cursor).await?,
    })
}

async fn table_exists(pool: &PgPool, name: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = current_schema() and table_name = $1
        )
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;
    Ok(exists)
}

/// One row of a queue's cursor history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRow {
    pub seq: Seq,
    pub written_at_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Statements {
    upsert_item: String,
    get_item: String,
    range_asc: String,
    range_desc: String,
    latest: String,
    record: String,
    history: String,
}

impl Statements {
    fn new(t: &TableNames) -> Self {
        let range = |order: &str| {
            format!(
                "select queue_key, seq, payload from {items} \
                 where queue_key = $1 and seq between $2 and $3 \
                 order by seq {order} limit $4",
                items = t.items
            )
        };
        Self {
            upsert_item: format!(
                "insert into {items} (queue_key, seq, payload) values ($1, $2, $3) \
                 on conflict (queue_key, seq) \
                 do update set payload = excluded.payload, stored_at_utc = now()",
                items = t.items
            ),
            get_item: format!(
                "select queue_key, seq, payload from {items} where queue_key = $1 and seq = $2",
                items = t.items
            ),
            range_asc: range("asc"),
            range_desc: range("desc"),
            latest: format!(
                "select max(seq) from {cursor} where queue_key = $1",
                cursor = t.cursor
            ),
            record: format!(
                "insert into {cursor} (queue_key, seq) values ($1, $2) \
                 on conflict (queue_key, seq) do nothing",
                cursor = t.cursor
            ),
            history: format!(
                "select seq, written_at_utc from {cursor} where queue_key = $1 order by seq asc",
                cursor = t.cursor
            ),
        }
    }
}

/// Postgres-backed item + cursor store. Cheap to clone (shares the pool).
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    tables: TableNames,
    sql: Statements,
}

impl PgStore {
    pub fn new(pool: PgPool, tables: TableNames) -> Result<Self> {
        tables.validate()?;
        let sql = Statements::new(&tables);
        Ok(Self { pool, tables, sql })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Every recorded cursor value for `queue`, ascending.
    pub async fn cursor_history(&self, queue: &str) -> Result<Vec<CursorRow>> {
        let rows = sqlx::query(&self.sql.history)
            .bind(queue)
            .fetch_all(&self.pool)
            .await
            .context("cursor_history query failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(CursorRow {
                seq: r.try_get("seq").context("cursor.seq")?,
                written_at_utc: r.try_get("written_at_utc").context("cursor.written_at_utc")?,
            });
        }
        Ok(out)
    }
}

fn item_from_row(r: &PgRow) -> Result<Item> {
    Ok(Item {
        queue: r.try_get::<String, _>("queue_key").context("items.queue_key")?,
        seq: r.try_get::<i64, _>("seq").context("items.seq")?,
        payload: r.try_get::<Value, _>("payload").context("items.payload")?,
    })
}

#[async_trait]
impl ItemStore for PgStore {
    async fn upsert_item(&self, item: &Item) -> Result<()> {
        sqlx::query(&self.sql.upsert_item)
            .bind(&item.queue)
            .bind(item.seq)
            .bind(&item.payload)
            .execute(&self.pool)
            .await
            .context("upsert_item failed")?;
        Ok(())
    }

    async fn get_item(&self, queue: &str, seq: Seq) -> Result<Option<Item>> {
        let row = sqlx::query(&self.sql.get_item)
            .bind(queue)
            .bind(seq)
            .fetch_optional(&self.pool)
            .await
            .context("get_item failed")?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn query_range(
        &self,
        queue: &str,
        range: SeqRange,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<Item>> {
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let sql = match order {
            SortOrder::Ascending => &self.sql.range_asc,
            SortOrder::Descending => &self.sql.range_desc,
        };
        let limit = i64::try_from(limit).context("query_range limit overflows i64")?;

        let rows = sqlx::query(sql)
            .bind(queue)
            .bind(range.lo)
            .bind(range.hi)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("query_range failed")?;

        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn latest(&self, queue: &str) -> Result<Option<Seq>> {
        let max: Option<i64> = sqlx::query_scalar(&self.sql.latest)
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .context("cursor latest query failed")?;
        Ok(max)
    }

    async fn record(&self, queue: &str, seq: Seq) -> Result<()> {
        sqlx::query(&self.sql.record)
            .bind(queue)
            .bind(seq)
            .execute(&self.pool)
            .await
            .context("cursor record failed")?;
        Ok(())
    }

    async fn compare_and_record(&self, queue: &str, expected: Seq, new: Seq) -> Result<CasOutcome> {
        let mut tx = self.pool.begin().await.context("cursor cas begin failed")?;

        // Serializes conditional writers of one queue until commit/rollback.
        sqlx::query("select pg_advisory_xact_lock(hashtext($1))")
            .bind(queue)
            .execute(&mut *tx)
            .await
            .context("cursor cas lock failed")?;

        let current: Option<i64> = sqlx::query_scalar(&self.sql.latest)
            .bind(queue)
            .fetch_one(&mut *tx)
            .await
            .context("cursor cas read failed")?;
        let current = current.unwrap_or(NO_CURSOR);

        if current != expected {
            tx.rollback().await.context("cursor cas rollback failed")?;
            return Ok(CasOutcome::Conflict { current });
        }

        sqlx::query(&self.sql.record)
            .bind(queue)
            .bind(new)
            .execute(&mut *tx)
            .await
            .context("cursor cas write failed")?;
        tx.commit().await.context("cursor cas commit failed")?;

        Ok(CasOutcome::Applied)
    }
}
