use crate::config::Config;
use crate::model::*;
use crate::store::{Atomic, ItemStore, SessionStore, UserStore};
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use sha2::{Digest, Sha256};
use futures_util::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[
    ("001_schema.sql", include_str!("migrations/001_schema.sql")),
    ("002_sessions.sql", include_str!("migrations/002_sessions.sql")),
];

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub(crate) fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    // Held by every writer, transactional or not, so a plain write never lands
    // inside someone else's transaction.
    tx_lock: Arc<Mutex<()>>,
    turso_url: Option<String>,
    turso_auth_token: Option<String>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_replica(turso_url: &Option<String>, turso_auth_token: &Option<String>) -> bool {
        turso_url.is_some() && turso_auth_token.is_some()
    }

    pub async fn sync(&self) -> Result<()> {
        if Self::is_replica(&self.turso_url, &self.turso_auth_token) {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = format!("INSERT INTO _migrations (name, applied_at) VALUES (?, {NOW})");
        conn.execute(&query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    async fn migrate(conn: &Connection) -> Result<()> {
        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Self::run_migration(conn, filename, sql).await?;
        }
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let turso_url = cfg.app.turso_url.clone();
        let turso_auth_token = cfg.app.turso_auth_token.clone();

        let db = match (&turso_url, &turso_auth_token) {
            (Some(url), Some(token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                Builder::new_synced_database(&path, url.clone(), token.clone())
                    .sync_interval(sync_interval)
                    .build()
                    .await?
            }
            _ => Builder::new_local(&path).build().await?,
        };

        Self::open(db, turso_url, turso_auth_token).await
    }

    /// A private, throwaway database. Used by tests.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::open(db, None, None).await
    }

    async fn open(
        db: LibsqlDatabase,
        turso_url: Option<String>,
        turso_auth_token: Option<String>,
    ) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        Self::migrate(&conn).await?;

        Ok(Database {
            db,
            conn,
            tx_lock: Arc::new(Mutex::new(())),
            turso_url,
            turso_auth_token,
        })
    }

    /// Takes the writer lock. A transaction left open on the shared
    /// connection (its rollback could not be scheduled) is rolled back first.
    async fn write_lock(&self) -> OwnedMutexGuard<()> {
        let guard = self.tx_lock.clone().lock_owned().await;
        if !self.conn.is_autocommit() {
            tracing::warn!("[db] found dangling transaction, rolling back");
            if let Err(e) = self.conn.execute("ROLLBACK", ()).await {
                tracing::error!(error = %e, "[db] failed to roll back dangling transaction");
            }
        }
        guard
    }

    async fn begin(&self) -> Result<Transaction> {
        let guard = self.write_lock().await;
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(Transaction {
            conn: self.conn.clone(),
            guard: Some(guard),
            open: true,
        })
    }

    async fn collect_exam_ids(&self, query: &str, user_id: &UserId) -> Result<BTreeSet<ExamId>> {
        let mut ids = BTreeSet::new();
        let mut rows = self.conn.query(query, libsql::params![user_id.as_str()]).await?;
        while let Some(row) = rows.next().await? {
            ids.insert(ExamId::new(row.get::<String>(0)?));
        }
        Ok(ids)
    }

    async fn load_folders(&self, user_id: &UserId) -> Result<Vec<Folder>> {
        let mut folders = Vec::new();
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, position FROM folders WHERE user_id = ? ORDER BY position, created_at",
                libsql::params![user_id.as_str()],
            )
            .await?;
        while let Some(row) = rows.next().await? {
            folders.push(Folder {
                id: FolderId::new(row.get::<String>(0)?),
                name: row.get(1)?,
                position: row.get(2)?,
                exams: BTreeSet::new(),
            });
        }

        let query = r#"
            SELECT folder_exams.folder_id, folder_exams.exam_id
            FROM folder_exams
            JOIN folders ON folders.id = folder_exams.folder_id
            WHERE folders.user_id = ?
        "#;
        let mut members: HashMap<String, BTreeSet<ExamId>> = HashMap::new();
        let mut rows = self.conn.query(query, libsql::params![user_id.as_str()]).await?;
        while let Some(row) = rows.next().await? {
            members
                .entry(row.get::<String>(0)?)
                .or_default()
                .insert(ExamId::new(row.get::<String>(1)?));
        }

        for folder in &mut folders {
            if let Some(exams) = members.remove(folder.id.as_str()) {
                folder.exams = exams;
            }
        }
        Ok(folders)
    }

    async fn load_exam_files(&self, exam_id: &ExamId) -> Result<Vec<ExamFile>> {
        let mut files = Vec::new();
        let mut rows = self
            .conn
            .query(
                "SELECT id, type, url, name, file_id FROM exam_files WHERE exam_id = ? ORDER BY rowid",
                libsql::params![exam_id.as_str()],
            )
            .await?;
        while let Some(row) = rows.next().await? {
            files.push(ExamFile {
                id: row.get(0)?,
                file_type: row.get(1)?,
                url: row.get(2)?,
                name: row.get(3)?,
                file_id: row.get(4)?,
            });
        }
        Ok(files)
    }

    pub async fn create_user(&self, email: &str, name: Option<&str>) -> Result<UserId> {
        let _guard = self.write_lock().await;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO users (email, name) VALUES (?, ?) RETURNING id",
                libsql::params![email, name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(UserId::new(row.get::<String>(0)?))
        } else {
            anyhow::bail!("Failed to create user: {}", email)
        }
    }

    pub async fn create_exam(&self, input: NewExam) -> Result<ExamId> {
        let _guard = self.write_lock().await;
        let query = r#"
            INSERT INTO exams (title, course_name, instructor, semester, exam_type, has_answers, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#;

        let mut rows = self
            .conn
            .query(
                query,
                libsql::params![
                    input.title,
                    input.course_name,
                    input.instructor,
                    input.semester,
                    input.exam_type,
                    input.has_answers as i64,
                    input.description
                ],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(ExamId::new(row.get::<String>(0)?))
        } else {
            anyhow::bail!("Failed to create exam")
        }
    }

    pub async fn add_exam_file(&self, exam_id: &ExamId, file: NewExamFile) -> Result<String> {
        let _guard = self.write_lock().await;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO exam_files (exam_id, type, url, name, file_id) VALUES (?, ?, ?, ?, ?) RETURNING id",
                libsql::params![exam_id.as_str(), file.file_type, file.url, file.name, file.file_id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(row.get(0)?)
        } else {
            anyhow::bail!("Failed to attach file to exam {}", exam_id)
        }
    }

    /// Appends a folder to the end of the user's folder list.
    pub async fn create_folder(&self, user_id: &UserId, name: &str) -> Result<Folder> {
        let _guard = self.write_lock().await;
        let query = r#"
            INSERT INTO folders (user_id, name, position)
            VALUES (?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM folders WHERE user_id = ?))
            RETURNING id, name, position
        "#;

        let mut rows = self
            .conn
            .query(query, libsql::params![user_id.as_str(), name, user_id.as_str()])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Folder {
                id: FolderId::new(row.get::<String>(0)?),
                name: row.get(1)?,
                position: row.get(2)?,
                exams: BTreeSet::new(),
            })
        } else {
            anyhow::bail!("Failed to create folder {} for user {}", name, user_id)
        }
    }

    /// Issues a session for `user_id` and returns the raw token. Only the
    /// token's SHA-256 digest is stored.
    pub async fn create_session(&self, user_id: &UserId, ttl: chrono::Duration) -> Result<String> {
        let _guard = self.write_lock().await;
        let mut rows = self.conn.query("SELECT lower(hex(randomblob(32)))", ()).await?;
        let token: String = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => anyhow::bail!("Failed to generate session token"),
        };

        let expires_at = (chrono::Utc::now() + ttl)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        self.conn
            .execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?, ?, ?)",
                libsql::params![hash_token(&token), user_id.as_str(), expires_at],
            )
            .await?;

        Ok(token)
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        let _guard = self.write_lock().await;
        let query = format!("DELETE FROM sessions WHERE expires_at <= {NOW}");
        Ok(self.conn.execute(&query, ()).await?)
    }
}

impl UserStore for Database {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, email, name FROM users WHERE id = ?",
                libsql::params![user_id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let id = UserId::new(row.get::<String>(0)?);
        let email: String = row.get(1)?;
        let name: Option<String> = row.get(2)?;

        let saved_exams = self
            .collect_exam_ids("SELECT exam_id FROM saved_exams WHERE user_id = ?", &id)
            .await?;
        let flashed_exams = self
            .collect_exam_ids("SELECT exam_id FROM flashed_exams WHERE user_id = ?", &id)
            .await?;
        let folders = self.load_folders(&id).await?;

        Ok(Some(User {
            id,
            email,
            name,
            saved_exams,
            flashed_exams,
            folders,
        }))
    }

    async fn add_saved(&self, user_id: &UserId, exam_id: &ExamId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO saved_exams (user_id, exam_id) VALUES (?, ?)",
                libsql::params![user_id.as_str(), exam_id.as_str()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn remove_saved(&self, user_id: &UserId, exam_id: &ExamId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM saved_exams WHERE user_id = ? AND exam_id = ?",
                libsql::params![user_id.as_str(), exam_id.as_str()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn add_flashed(&self, user_id: &UserId, exam_id: &ExamId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO flashed_exams (user_id, exam_id) VALUES (?, ?)",
                libsql::params![user_id.as_str(), exam_id.as_str()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn remove_flashed(&self, user_id: &UserId, exam_id: &ExamId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM flashed_exams WHERE user_id = ? AND exam_id = ?",
                libsql::params![user_id.as_str(), exam_id.as_str()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn pull_from_all_folders(&self, user_id: &UserId, exam_id: &ExamId) -> Result<()> {
        let query = r#"
            DELETE FROM folder_exams
            WHERE exam_id = ?
              AND folder_id IN (SELECT id FROM folders WHERE user_id = ?)
        "#;
        self.conn
            .execute(query, libsql::params![exam_id.as_str(), user_id.as_str()])
            .await?;
        Ok(())
    }

    async fn add_to_folders(
        &self,
        user_id: &UserId,
        exam_id: &ExamId,
        folder_ids: &[FolderId],
    ) -> Result<Vec<FolderId>> {
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; folder_ids.len()].join(", ");
        let query = format!(
            "SELECT id FROM folders WHERE user_id = ? AND id IN ({}) ORDER BY position, created_at",
            placeholders
        );
        let mut params: Vec<libsql::Value> = Vec::with_capacity(folder_ids.len() + 1);
        params.push(user_id.as_str().into());
        for folder_id in folder_ids {
            params.push(folder_id.as_str().into());
        }

        let mut owned = Vec::new();
        let mut rows = self.conn.query(&query, params).await?;
        while let Some(row) = rows.next().await? {
            owned.push(FolderId::new(row.get::<String>(0)?));
        }

        for folder_id in &owned {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO folder_exams (folder_id, exam_id) VALUES (?, ?)",
                    libsql::params![folder_id.as_str(), exam_id.as_str()],
                )
                .await?;
        }

        Ok(owned)
    }
}

impl ItemStore for Database {
    async fn find_exam(&self, exam_id: &ExamId) -> Result<Option<Exam>> {
        let query = r#"
            SELECT id, title, course_name, instructor, semester, exam_type,
                   has_answers, description, lightning, created_at
            FROM exams WHERE id = ?
        "#;

        let mut rows = self.conn.query(query, libsql::params![exam_id.as_str()]).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let mut exam = Exam {
            id: ExamId::new(row.get::<String>(0)?),
            title: row.get(1)?,
            course_name: row.get(2)?,
            instructor: row.get(3)?,
            semester: row.get(4)?,
            exam_type: row.get(5)?,
            has_answers: row.get::<i64>(6)? != 0,
            description: row.get(7)?,
            lightning: row.get(8)?,
            created_at: row.get(9)?,
            files: Vec::new(),
        };
        exam.files = self.load_exam_files(&exam.id).await?;

        Ok(Some(exam))
    }

    async fn adjust_lightning(&self, exam_id: &ExamId, delta: i64) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "UPDATE exams SET lightning = MAX(lightning + ?, 0) WHERE id = ? RETURNING lightning",
                libsql::params![delta, exam_id.as_str()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }
}

impl SessionStore for Database {
    async fn find_session_user(&self, token: &str) -> Result<Option<UserId>> {
        let query = format!(
            r#"
            SELECT users.id
            FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.token_hash = ? AND sessions.expires_at > {NOW}
            "#
        );

        let mut rows = self.conn.query(&query, libsql::params![hash_token(token)]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(UserId::new(row.get::<String>(0)?)))
        } else {
            Ok(None)
        }
    }
}

impl Atomic for Database {
    async fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<anyhow::Error> + Send,
        F: for<'c> FnOnce(&'c Self) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        let tx = self.begin().await.map_err(E::from)?;
        match work(self).await {
            Ok(value) => {
                tx.commit().await.map_err(E::from)?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback().await;
                Err(e)
            }
        }
    }
}

/// An open transaction on the shared connection. Holds the writer lock until
/// it is committed or rolled back. Dropping it while still open (the caller's
/// future was cancelled) rolls back on a spawned task, which keeps the lock
/// until the rollback has run.
struct Transaction {
    conn: Connection,
    guard: Option<OwnedMutexGuard<()>>,
    open: bool,
}

impl Transaction {
    async fn commit(mut self) -> Result<()> {
        self.conn.execute("COMMIT", ()).await?;
        self.open = false;
        Ok(())
    }

    async fn rollback(mut self) {
        if let Err(e) = self.conn.execute("ROLLBACK", ()).await {
            tracing::error!(error = %e, "[db] rollback failed");
        }
        self.open = false;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let Some(guard) = self.guard.take() else {
            return;
        };

        let conn = self.conn.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("[db] transaction abandoned, rolling back");
                handle.spawn(async move {
                    let _guard = guard;
                    if let Err(e) = conn.execute("ROLLBACK", ()).await {
                        tracing::error!(error = %e, "[db] rollback of abandoned transaction failed");
                    }
                });
            }
            // The next writer finds the transaction open and rolls it back.
            Err(_) => tracing::warn!("[db] transaction abandoned outside a runtime"),
        }
    }
}
