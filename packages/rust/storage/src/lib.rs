//! libSQL-backed store for reusable specification artifacts.
//!
//! PDFs, structure descriptions and XML samples saved here can be referenced
//! by id in later generations. Saving identical content of the same kind
//! twice returns the existing record.

mod migrations;

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use bmecat_shared::{BmecatError, Result, SpecId, SpecKind, StoredSpecification};

/// CRUD over stored specifications.
pub trait SpecStore {
    /// All stored specifications, newest first.
    fn list(&self) -> impl Future<Output = Result<Vec<StoredSpecification>>>;

    /// Store `content` under `name`, or return the existing record with the same content and kind.
    fn save(
        &self,
        name: &str,
        kind: SpecKind,
        content: &str,
    ) -> impl Future<Output = Result<StoredSpecification>>;

    fn get(&self, id: &SpecId) -> impl Future<Output = Result<Option<StoredSpecification>>>;

    /// Remove a specification. Returns whether a record was deleted.
    fn delete(&self, id: &SpecId) -> impl Future<Output = Result<bool>>;
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    conn: Connection,
}

fn storage_err(e: impl std::fmt::Display) -> BmecatError {
    BmecatError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BmecatError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    BmecatError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    async fn find_by_hash(&self, kind: SpecKind, sha256: &str) -> Result<Option<StoredSpecification>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, kind, content, sha256, created_at FROM specifications
                 WHERE kind = ?1 AND sha256 = ?2",
                params![kind.as_str(), sha256],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_spec(&row)?)),
            None => Ok(None),
        }
    }
}

impl SpecStore for Storage {
    async fn list(&self) -> Result<Vec<StoredSpecification>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, kind, content, sha256, created_at FROM specifications
                 ORDER BY created_at DESC, id DESC",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut specs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            specs.push(row_to_spec(&row)?);
        }
        Ok(specs)
    }

    #[instrument(skip_all, fields(name = %name, kind = kind.as_str()))]
    async fn save(&self, name: &str, kind: SpecKind, content: &str) -> Result<StoredSpecification> {
        if name.trim().is_empty() {
            return Err(BmecatError::validation("specification name must not be empty"));
        }
        if content.is_empty() {
            return Err(BmecatError::empty_input("specification content"));
        }

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let sha256 = format!("{:x}", hasher.finalize());

        if let Some(existing) = self.find_by_hash(kind, &sha256).await? {
            debug!(id = %existing.id, "identical specification already stored");
            return Ok(existing);
        }

        let spec = StoredSpecification {
            id: SpecId::new(),
            name: name.trim().to_string(),
            kind,
            content: content.to_string(),
            sha256,
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO specifications (id, name, kind, content, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    spec.id.to_string(),
                    spec.name.as_str(),
                    kind.as_str(),
                    spec.content.as_str(),
                    spec.sha256.as_str(),
                    spec.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;

        info!(id = %spec.id, bytes = spec.content.len(), "specification stored");
        Ok(spec)
    }

    async fn get(&self, id: &SpecId) -> Result<Option<StoredSpecification>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, kind, content, sha256, created_at FROM specifications WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_spec(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &SpecId) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM specifications WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        debug!(%id, affected, "specification delete");
        Ok(affected > 0)
    }
}

/// Convert a database row to a [`StoredSpecification`].
fn row_to_spec(row: &libsql::Row) -> Result<StoredSpecification> {
    let id: String = row.get(0).map_err(storage_err)?;
    let kind: String = row.get(2).map_err(storage_err)?;
    let created_at: String = row.get(5).map_err(storage_err)?;

    Ok(StoredSpecification {
        id: id
            .parse()
            .map_err(|e| BmecatError::Storage(format!("invalid specification id {id}: {e}")))?,
        name: row.get(1).map_err(storage_err)?,
        kind: kind.parse().map_err(storage_err)?,
        content: row.get(3).map_err(storage_err)?,
        sha256: row.get(4).map_err(storage_err)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| BmecatError::Storage(format!("invalid date: {e}")))?,
    })
}
