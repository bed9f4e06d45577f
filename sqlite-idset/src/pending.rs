use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_ids (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,
    set_key   TEXT NOT NULL,
    id        TEXT NOT NULL,
    added_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (set_key, id)
);
"#;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A named set of pending ids persisted in a SQLite file.
///
/// Several processes may open the same file with the same key; they all see
/// one set. Adding an id that is already pending is a no-op, and ids come
/// back from [`PendingIds::snapshot`] in the order they were first added.
pub struct PendingIds {
    path: PathBuf,
    key: String,
    conn: Connection,
}

impl PendingIds {
    pub fn open(path: impl AsRef<Path>, key: &str) -> Result<Self> {
        if key.is_empty() {
            bail!("pending id set key cannot be empty");
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_private_dirs(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open id set database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .context("failed to enable WAL for id set")?;
        conn.pragma_update(None, "synchronous", "normal").ok();
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("failed to set busy timeout")?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize id set schema")?;
        Ok(Self {
            path: path.to_path_buf(),
            key: key.to_string(),
            conn,
        })
    }

    /// Adds ids in one transaction. Returns how many were not already pending.
    pub fn add(&self, ids: &[String]) -> Result<u64> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to begin id set transaction")?;
        let mut inserted = 0u64;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO pending_ids(set_key, id) VALUES (?1, ?2)")?;
            for id in ids {
                inserted += stmt.execute(params![self.key, id])? as u64;
            }
        }
        tx.commit().context("failed to commit pending ids")?;
        Ok(inserted)
    }

    /// Removes exactly the given ids. Ids added concurrently by other
    /// producers are left alone.
    pub fn remove(&self, ids: &[String]) -> Result<u64> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to begin id set transaction")?;
        let mut removed = 0u64;
        {
            let mut stmt = tx.prepare("DELETE FROM pending_ids WHERE set_key = ?1 AND id = ?2")?;
            for id in ids {
                removed += stmt.execute(params![self.key, id])? as u64;
            }
        }
        tx.commit().context("failed to commit id removal")?;
        Ok(removed)
    }

    pub fn snapshot(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM pending_ids WHERE set_key = ?1 ORDER BY seq ASC")?;
        let mut rows = stmt.query([&self.key])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row.get(0)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_ids WHERE set_key = ?1",
            [&self.key],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates `dir` and any missing ancestors. Only directories created here
/// are restricted to the owner; existing ones keep their permissions.
fn create_private_dirs(dir: &Path) -> Result<()> {
    let missing: Vec<&Path> = dir
        .ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .collect();
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create id set directory {}", dir.display()))?;
    for created in missing {
        set_owner_perms(created)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_owner_perms(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    perms.set_mode(0o700);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_perms(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_empty_key() {
        let dir = tempdir().unwrap();
        assert!(PendingIds::open(dir.path().join("ids.db"), "").is_err());
    }

    #[test]
    fn add_reports_only_new_ids() {
        let dir = tempdir().unwrap();
        let ids = PendingIds::open(dir.path().join("ids.db"), "users").unwrap();
        assert_eq!(ids.add(&["a".into(), "b".into()]).unwrap(), 2);
        assert_eq!(ids.add(&["b".into(), "c".into()]).unwrap(), 1);
        assert_eq!(ids.len().unwrap(), 3);
    }
}
