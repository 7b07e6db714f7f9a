use chrono::Utc;
use rusqlite::params;

use peerbook_shared::Person;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Snapshot;

impl Database {
    /// Insert a confirmed individual contact. Replaces a stale address.
    pub fn upsert_contact(&self, person: &Person) -> Result<()> {
        self.conn().execute(
            "INSERT INTO contacts (username, address, port, added_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO UPDATE SET address = excluded.address, port = excluded.port",
            params![
                person.username,
                person.address,
                person.port,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, username: &str) -> Result<Person> {
        self.conn()
            .query_row(
                "SELECT username, address, port FROM contacts WHERE username = ?1",
                params![username],
                row_to_person,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_contacts(&self) -> Result<Vec<Person>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT username, address, port FROM contacts ORDER BY username ASC")?;
        let rows = stmt.query_map([], row_to_person)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Everything needed to rebuild the in-memory contact list.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            people: self.list_contacts()?,
            groups: self.list_groups()?,
            requests: self.list_requests()?,
        })
    }
}

pub(crate) fn row_to_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        username: row.get(0)?,
        address: row.get(1)?,
        port: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_refreshes_address() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_contact(&Person::new("alice", "10.0.0.1", 5001)).unwrap();
        db.upsert_contact(&Person::new("alice", "10.0.0.2", 5002)).unwrap();

        let alice = db.get_contact("alice").unwrap();
        assert_eq!(alice.address, "10.0.0.2");
        assert_eq!(alice.port, 5002);
        assert_eq!(db.list_contacts().unwrap().len(), 1);
    }

    #[test]
    fn missing_contact_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_contact("nobody"), Err(StoreError::NotFound)));
    }
}
