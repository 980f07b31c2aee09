//! Versioned-SQL migration runner.
//!
//! Migration files live in `migrations/` and are named
//! `<version>_<slug>.sql`; versions sort lexicographically. Applied versions
//! are recorded in `schema_migrations` together with a SHA-256 checksum of
//! the file content. If any applied version's file has drifted from the
//! recorded checksum the runner refuses to proceed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::db::Db;
use crate::errors::{AppError, AppResult};

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub path: PathBuf,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub applied: bool,
    pub applied_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone)]
struct AppliedRow {
    version: String,
    checksum: String,
    applied_at: chrono::DateTime<chrono::Utc>,
}

pub struct Migrator {
    db: Db,
    dir: PathBuf,
}

impl Migrator {
    pub fn new(db: Db, dir: impl Into<PathBuf>) -> Self {
        Self { db, dir: dir.into() }
    }

    /// Apply all pending migrations in version order, one transaction each.
    /// A single failure halts the run. Returns the versions applied.
    pub async fn run(&self, dry_run: bool) -> AppResult<Vec<String>> {
        self.ensure_meta_table().await?;

        let files = list_migration_files(&self.dir)?;
        let applied = self.applied_rows().await?;
        self.check_drift(&files, &applied)?;

        let applied_versions: std::collections::HashSet<&str> =
            applied.iter().map(|r| r.version.as_str()).collect();
        let pending: Vec<&MigrationFile> = files
            .iter()
            .filter(|f| !applied_versions.contains(f.version.as_str()))
            .collect();

        if pending.is_empty() {
            tracing::info!("migrations: nothing to apply");
            return Ok(Vec::new());
        }

        let mut done = Vec::new();
        for file in pending {
            if dry_run {
                tracing::info!(version = %file.version, "dry-run: would apply {}", file.name);
                done.push(file.version.clone());
                continue;
            }

            let sql = std::fs::read_to_string(&file.path)?;
            let started = Instant::now();

            let mut tx = self.db.pool().begin().await?;
            if let Err(e) = sqlx::raw_sql(&sql).execute(&mut *tx).await {
                let _ = tx.rollback().await;
                return Err(AppError::Internal(format!(
                    "migration {} failed: {e}",
                    file.name
                )));
            }
            let elapsed_ms = started.elapsed().as_millis() as i64;
            sqlx::query(
                "INSERT INTO schema_migrations (version, applied_at, execution_time_ms, checksum) \
                 VALUES ($1, NOW(), $2, $3)",
            )
            .bind(&file.version)
            .bind(elapsed_ms)
            .bind(&file.checksum)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            tracing::info!(version = %file.version, elapsed_ms, "applied {}", file.name);
            done.push(file.version.clone());
        }

        Ok(done)
    }

    /// Per-version applied/pending report.
    pub async fn status(&self) -> AppResult<Vec<MigrationStatus>> {
        self.ensure_meta_table().await?;
        let files = list_migration_files(&self.dir)?;
        let applied = self.applied_rows().await?;

        Ok(files
            .into_iter()
            .map(|f| {
                let row = applied.iter().find(|r| r.version == f.version);
                MigrationStatus {
                    version: f.version,
                    name: f.name,
                    applied: row.is_some(),
                    applied_at: row.map(|r| r.applied_at),
                }
            })
            .collect())
    }

    async fn ensure_meta_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (\
                 version VARCHAR(255) PRIMARY KEY, \
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
                 execution_time_ms BIGINT NOT NULL DEFAULT 0, \
                 checksum VARCHAR(64) NOT NULL\
             )",
        )
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn applied_rows(&self) -> AppResult<Vec<AppliedRow>> {
        let rows = sqlx::query(
            "SELECT version, checksum, applied_at FROM schema_migrations ORDER BY version",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AppliedRow {
                version: r.get("version"),
                checksum: r.get("checksum"),
                applied_at: r.get("applied_at"),
            })
            .collect())
    }

    fn check_drift(&self, files: &[MigrationFile], applied: &[AppliedRow]) -> AppResult<()> {
        for row in applied {
            let Some(file) = files.iter().find(|f| f.version == row.version) else {
                tracing::warn!(version = %row.version, "applied migration has no file on disk");
                continue;
            };
            if file.checksum != row.checksum {
                return Err(AppError::Internal(format!(
                    "migration drift detected for {}: recorded checksum {} but file is {}; \
                     refusing to proceed",
                    row.version,
                    &row.checksum[..12.min(row.checksum.len())],
                    &file.checksum[..12.min(file.checksum.len())],
                )));
            }
        }
        Ok(())
    }
}

/// List `<version>_<slug>.sql` files in lexicographic (= application) order.
pub fn list_migration_files(dir: &Path) -> AppResult<Vec<MigrationFile>> {
    if !dir.is_dir() {
        return Err(AppError::Validation(format!(
            "migrations directory not found: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let Some((version, _slug)) = name.trim_end_matches(".sql").split_once('_') else {
            tracing::warn!(file = %name, "skipping migration without <version>_<slug> name");
            continue;
        };
        let content = std::fs::read(&path)?;
        files.push(MigrationFile {
            version: version.to_string(),
            checksum: checksum_hex(&content),
            name,
            path,
        });
    }

    files.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(files)
}

pub fn checksum_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sql(dir: &Path, name: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn lists_files_in_version_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_sql(tmp.path(), "010_later.sql", "SELECT 10;");
        write_sql(tmp.path(), "002_second.sql", "SELECT 2;");
        write_sql(tmp.path(), "001_first.sql", "SELECT 1;");
        write_sql(tmp.path(), "README.md", "not sql");

        let files = list_migration_files(tmp.path()).unwrap();
        let versions: Vec<&str> = files.iter().map(|f| f.version.as_str()).collect();
        assert_eq!(versions, vec!["001", "002", "010"]);
    }

    #[test]
    fn skips_files_without_version_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        write_sql(tmp.path(), "noversion.sql", "SELECT 1;");
        let files = list_migration_files(tmp.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn checksum_is_sha256_hex() {
        let sum = checksum_hex(b"hello");
        assert_eq!(sum.len(), 64);
        assert_eq!(
            sum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn checksum_changes_with_content() {
        assert_ne!(checksum_hex(b"a"), checksum_hex(b"b"));
    }

    #[test]
    fn missing_dir_is_an_error() {
        let err = list_migration_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.to_string().contains("migrations directory"));
    }
}
