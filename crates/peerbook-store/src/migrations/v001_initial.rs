//! v001 -- Initial schema creation.
//!
//! Creates `contacts`, `groups`, `group_members` and `friend_requests`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Confirmed individual contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    username   TEXT PRIMARY KEY NOT NULL,
    address    TEXT NOT NULL,
    port       INTEGER NOT NULL,
    added_at   TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Groups; membership is a snapshot taken at creation
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    name       TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS group_members (
    group_name TEXT NOT NULL,
    username   TEXT NOT NULL,
    address    TEXT NOT NULL,
    port       INTEGER NOT NULL,

    PRIMARY KEY (group_name, username),
    FOREIGN KEY (group_name) REFERENCES groups(name) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Pending friend requests, both directions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    username   TEXT PRIMARY KEY NOT NULL,
    direction  TEXT NOT NULL CHECK (direction IN ('outgoing', 'incoming')),
    address    TEXT NOT NULL,
    port       INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_friend_requests_direction
    ON friend_requests(direction);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
