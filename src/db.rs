//! Thin SQL layer over the Postgres pool.
//!
//! All statements are parameterized. Queries slower than 100 ms are logged at
//! `warn`. The transaction primitive commits on `Ok`, rolls back on `Err`,
//! and releases the connection on every exit path.

use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Execute, PgPool, Postgres, Transaction};

use crate::config::DatabaseConfig;
use crate::errors::AppResult;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

pub type Tx = Transaction<'static, Postgres>;
type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(cfg: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(cfg.pool_min)
            .max_connections(cfg.pool_max)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(&cfg.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lazy pool for tests — no live database required until first query.
    pub fn connect_lazy_test() -> Self {
        let pool = PgPool::connect_lazy("postgres://test@localhost:19999/test")
            .expect("lazy pool");
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn log_slow(sql: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > SLOW_QUERY_THRESHOLD {
            let head: String = sql.split_whitespace().take(8).collect::<Vec<_>>().join(" ");
            tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, sql = %head, "slow query");
        }
    }

    pub async fn execute(&self, query: PgQuery<'_>) -> AppResult<u64> {
        let sql = query.sql().to_string();
        let started = Instant::now();
        let result = query.execute(&self.pool).await?;
        Self::log_slow(&sql, started);
        Ok(result.rows_affected())
    }

    pub async fn query_one(&self, query: PgQuery<'_>) -> AppResult<PgRow> {
        let sql = query.sql().to_string();
        let started = Instant::now();
        let row = query.fetch_one(&self.pool).await?;
        Self::log_slow(&sql, started);
        Ok(row)
    }

    pub async fn query_opt(&self, query: PgQuery<'_>) -> AppResult<Option<PgRow>> {
        let sql = query.sql().to_string();
        let started = Instant::now();
        let row = query.fetch_optional(&self.pool).await?;
        Self::log_slow(&sql, started);
        Ok(row)
    }

    pub async fn query_many(&self, query: PgQuery<'_>) -> AppResult<Vec<PgRow>> {
        let sql = query.sql().to_string();
        let started = Instant::now();
        let rows = query.fetch_all(&self.pool).await?;
        Self::log_slow(&sql, started);
        Ok(rows)
    }

    /// Run `f` inside a transaction: BEGIN, commit on `Ok`, rollback on `Err`.
    /// The connection is returned to the pool on every path, including
    /// cancellation (sqlx rolls back a dropped transaction). Failed
    /// transactions are not retried here; the tool layer may retry.
    pub async fn transaction<T, F>(&self, f: F) -> AppResult<T>
    where
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, AppResult<T>>,
    {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Self::log_slow("<transaction>", started);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}
