//! # Schema Migrator
//!
//! Brings a database up to the newest embedded schema version.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MIGRATION FLOW                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PRAGMA user_version ──► current = 1                                   │
//! │                                                                         │
//! │  001-create-records.sql       (1 <= current)  skip                     │
//! │  002-create-records-data.sql  (2 >  current)  BEGIN                    │
//! │                                                 execute script         │
//! │                                                 user_version = 2       │
//! │                                               COMMIT                   │
//! │                                                                         │
//! │  A failing script rolls back its own transaction, so user_version      │
//! │  still names the last script that fully applied.                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rusqlite::Connection;

use crate::error::{Error, Result};

/// One versioned migration script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version parsed from the first three characters of the name
    pub version: u32,
    /// Script name, e.g. `001-create-records.sql`
    pub name: String,
    /// Script body
    pub sql: String,
}

impl Migration {
    /// Parse a script, taking its version from the 3-digit name prefix
    pub fn parse(name: &str, sql: &str) -> Result<Self> {
        let prefix = name
            .get(..3)
            .filter(|p| p.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| Error::InvalidMigrationName(name.to_string()))?;

        let version = prefix
            .parse::<u32>()
            .map_err(|_| Error::InvalidMigrationName(name.to_string()))?;

        Ok(Self {
            version,
            name: name.to_string(),
            sql: sql.to_string(),
        })
    }
}

/// Applies an ordered set of migrations, one transaction per script
#[derive(Debug, Clone)]
pub struct SchemaMigrator {
    migrations: Vec<Migration>,
}

impl SchemaMigrator {
    /// Build a migrator from `(name, sql)` pairs.
    ///
    /// Scripts are sorted by version; two scripts with the same version are
    /// rejected.
    pub fn new(scripts: &[(&str, &str)]) -> Result<Self> {
        let mut migrations = scripts
            .iter()
            .map(|(name, sql)| Migration::parse(name, sql))
            .collect::<Result<Vec<_>>>()?;

        migrations.sort_by_key(|m| m.version);

        if let Some(dup) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(Error::DuplicateMigration(dup[0].version));
        }

        Ok(Self { migrations })
    }

    /// Highest version known to this migrator
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// The sorted scripts
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Read the persisted schema version
    pub fn current_version(conn: &Connection) -> Result<u32> {
        conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))
            .map_err(|e| Error::Migration {
                version: 0,
                reason: format!("Failed to read user_version: {}", e),
            })
    }

    /// Apply every script newer than the persisted version.
    ///
    /// Returns the version the database is at afterwards. Running it again
    /// with nothing pending is a no-op.
    pub fn run(&self, conn: &mut Connection) -> Result<u32> {
        let current = Self::current_version(conn)?;
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > current)
            .collect();

        if pending.is_empty() {
            tracing::debug!(version = current, "Database schema is up to date");
            return Ok(current);
        }

        tracing::info!(
            current,
            latest = self.latest_version(),
            pending = pending.len(),
            "Running schema migrations"
        );

        let mut version = current;
        for migration in pending {
            Self::apply(conn, migration)?;
            version = migration.version;
            tracing::info!(version, name = migration.name.as_str(), "Migration applied");
        }

        Ok(version)
    }

    fn apply(conn: &mut Connection, migration: &Migration) -> Result<()> {
        let fail = |reason: String| Error::Migration {
            version: migration.version,
            reason,
        };

        let tx = conn
            .transaction()
            .map_err(|e| fail(format!("Failed to begin transaction: {}", e)))?;

        tx.execute_batch(&migration.sql)
            .map_err(|e| fail(format!("{}: {}", migration.name, e)))?;

        tx.pragma_update(None, "user_version", migration.version)
            .map_err(|e| fail(format!("Failed to set user_version: {}", e)))?;

        tx.commit()
            .map_err(|e| fail(format!("Failed to commit: {}", e)))
    }
}
