//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            name TEXT,
            source TEXT,
            meta_json TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS metric_points (
            id TEXT PRIMARY KEY,
            incident_id TEXT NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
            ts TEXT NOT NULL,
            metric_name TEXT NOT NULL,
            value REAL NOT NULL,
            CONSTRAINT uq_metric_point UNIQUE (incident_id, ts, metric_name)
        );

        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            incident_id TEXT NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
            ts TEXT NOT NULL,
            event_type TEXT NOT NULL,
            meta_json TEXT,
            CONSTRAINT uq_event UNIQUE (incident_id, ts, event_type)
        );

        CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at);
        CREATE INDEX IF NOT EXISTS idx_metric_incident_ts ON metric_points(incident_id, ts);
        CREATE INDEX IF NOT EXISTS idx_metric_incident_name_ts ON metric_points(incident_id, metric_name, ts);
        CREATE INDEX IF NOT EXISTS idx_event_incident_ts ON events(incident_id, ts);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["incidents", "metric_points", "events"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table} should start empty");
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_duplicate_metric_points_are_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO incidents (id, created_at) VALUES ('inc', '2024-05-01T12:00:00.000000Z')",
            [],
        )
        .unwrap();

        let insert = "INSERT OR IGNORE INTO metric_points (id, incident_id, ts, metric_name, value)
                      VALUES (?1, 'inc', '2024-05-01T12:00:00.000000Z', 'cpu', 1.0)";
        assert_eq!(conn.execute(insert, ["a"]).unwrap(), 1);
        assert_eq!(conn.execute(insert, ["b"]).unwrap(), 0);
    }
}
