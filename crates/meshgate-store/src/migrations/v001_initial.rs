//! v001 -- Initial schema creation.
//!
//! Creates the `node` table holding the last accepted position per mesh node.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Last known node positions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS node (
    id        INTEGER PRIMARY KEY NOT NULL,   -- mesh node number
    timestamp INTEGER NOT NULL,               -- device-reported time, unix seconds
    latitude  REAL,                           -- decimal degrees
    longitude REAL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
