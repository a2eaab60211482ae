use std::path::Path;
use std::time::Duration;

use color_eyre::{Result, eyre::Context};
use sea_orm::{ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS credential (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id TEXT NOT NULL,
    subject_kind TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (subject_id, subject_kind)
);
CREATE INDEX IF NOT EXISTS credential_owner_idx ON credential (owner_id);
";

pub struct Database {
    pub conn: DatabaseConnection,
}

impl Database {
    /// Open or create the credential database at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        tracing::debug!("Opening credential database at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create database directory: {}",
                parent.display()
            ))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(16)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt)
            .await
            .context(format!("Failed to open database: {}", path.display()))?;

        let database = Self { conn };
        database.ensure_schema().await?;
        Ok(database)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            self.conn
                .execute_unprepared(statement)
                .await
                .with_context(|| format!("Failed to execute schema statement: {}", statement))?;
        }
        Ok(())
    }
}
