use rusqlite::Connection;

/// WAL with a short busy wait; the cache is written by one CLI process at a
/// time but may be read concurrently.
pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 2000;\n",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_database_switches_to_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("pragma.sqlite")).unwrap();
        configure_connection(&conn).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
