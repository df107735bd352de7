//! Schema migrations.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its tracking row, so a failure
//! leaves the store at the last fully applied version.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in ascending version order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "create_surveys_table",
        sql: include_str!("sql/002_create_surveys.sql"),
    },
    Migration {
        version: 3,
        description: "create_status_history_tables",
        sql: include_str!("sql/003_create_status_history.sql"),
    },
    Migration {
        version: 4,
        description: "create_non_conformities_table",
        sql: include_str!("sql/004_create_non_conformities.sql"),
    },
    Migration {
        version: 5,
        description: "create_certificates_and_payments_tables",
        sql: include_str!("sql/005_create_certificates_and_payments.sql"),
    },
];

/// Brings the schema on `conn` up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied = applied_version(conn)?;
    let pending = migrations.iter().filter(|m| m.version > applied);

    for migration in pending {
        log::info!(
            "Applying schema v{} ({})",
            migration.version,
            migration.description
        );

        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        };
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}

/// Highest version recorded in `_migrations`, or 0 for a fresh store.
fn applied_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&conn).unwrap();
        conn
    }

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = migrated();
        assert_eq!(applied_version(&conn).unwrap(), 5);
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_versions_ascend_without_gaps() {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, index + 1);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = migrated();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_surveys_table_has_statement() {
        let conn = migrated();
        assert!(column_names(&conn, "surveys").contains(&"survey_statement".to_string()));
    }

    #[test]
    fn test_failed_migration_leaves_earlier_versions() {
        let conn = Connection::open_in_memory().unwrap();
        let broken = [
            Migration {
                version: 1,
                description: "create_a",
                sql: "CREATE TABLE a (id TEXT);",
            },
            Migration {
                version: 2,
                description: "create_b_then_fail",
                sql: "CREATE TABLE b (id TEXT); INSERT INTO missing VALUES (1);",
            },
        ];

        let err = apply(&conn, &broken).unwrap_err();
        assert!(matches!(err, DatabaseError::Migration { version: 2, .. }));

        assert_eq!(applied_version(&conn).unwrap(), 1);
        assert_eq!(column_names(&conn, "a"), vec!["id".to_string()]);
        // The half-applied v2 rolled back with its tracking row.
        assert!(column_names(&conn, "b").is_empty());
    }

    #[test]
    fn test_history_tables_reject_updates_and_deletes() {
        let conn = migrated();
        conn.execute_batch(
            "INSERT INTO jobs
                 (id, status, requires_survey, created_by, created_at, updated_at)
             VALUES ('j1', 'CREATED', 1, 'admin', '2026-01-01', '2026-01-01');
             INSERT INTO job_status_history
                 (job_id, previous_status, new_status, actor, created_at)
             VALUES ('j1', NULL, 'CREATED', 'admin', '2026-01-01');",
        )
        .unwrap();

        let update = conn.execute(
            "UPDATE job_status_history SET new_status = 'REJECTED' WHERE job_id = 'j1'",
            [],
        );
        assert!(update.is_err());

        let delete = conn.execute("DELETE FROM job_status_history WHERE job_id = 'j1'", []);
        assert!(delete.is_err());
    }

    #[test]
    fn test_requires_survey_is_immutable() {
        let conn = migrated();
        conn.execute_batch(
            "INSERT INTO jobs
                 (id, status, requires_survey, created_by, created_at, updated_at)
             VALUES ('j1', 'CREATED', 1, 'admin', '2026-01-01', '2026-01-01');",
        )
        .unwrap();

        let result = conn.execute("UPDATE jobs SET requires_survey = 0 WHERE id = 'j1'", []);
        assert!(result.is_err());
    }
}
