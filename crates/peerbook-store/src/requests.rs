use chrono::{DateTime, Utc};
use rusqlite::params;

use peerbook_shared::{Person, RequestDirection};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::PendingRequest;

impl Database {
    pub fn insert_request(&self, direction: RequestDirection, person: &Person) -> Result<()> {
        self.conn().execute(
            "INSERT INTO friend_requests (username, direction, address, port, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                person.username,
                direction.as_str(),
                person.address,
                person.port,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Drop a pending request once it was answered either way.
    pub fn delete_request(&self, username: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE username = ?1",
            params![username],
        )?;
        Ok(affected > 0)
    }

    /// Point a pending request at the address the person now reports.
    pub fn update_request_address(&self, person: &Person) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE friend_requests SET address = ?2, port = ?3 WHERE username = ?1",
            params![person.username, person.address, person.port],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Turn a pending request into a confirmed contact atomically.
    pub fn promote_request(&self, person: &Person) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM friend_requests WHERE username = ?1",
            params![person.username],
        )?;
        tx.execute(
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
        tx.commit()?;
        Ok(())
    }

    pub fn list_requests(&self) -> Result<Vec<PendingRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT username, direction, address, port, created_at
             FROM friend_requests ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_request)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingRequest> {
    let username: String = row.get(0)?;
    let direction_str: String = row.get(1)?;
    let address: String = row.get(2)?;
    let port: u16 = row.get(3)?;
    let created_str: String = row.get(4)?;

    let direction = RequestDirection::parse(&direction_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(StoreError::Corrupt(format!(
                "unknown request direction '{direction_str}'"
            ))),
        )
    })?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(PendingRequest {
        direction,
        person: Person::new(username, address, port),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_keep_direction() {
        let db = Database::open_in_memory().unwrap();
        db.insert_request(RequestDirection::Outgoing, &Person::new("bob", "10.0.0.2", 5002))
            .unwrap();
        db.insert_request(RequestDirection::Incoming, &Person::new("carol", "10.0.0.3", 5003))
            .unwrap();

        let requests = db.list_requests().unwrap();
        assert_eq!(requests.len(), 2);
        let bob = requests.iter().find(|r| r.person.username == "bob").unwrap();
        assert_eq!(bob.direction, RequestDirection::Outgoing);
        let carol = requests.iter().find(|r| r.person.username == "carol").unwrap();
        assert_eq!(carol.direction, RequestDirection::Incoming);
        assert_eq!(carol.person.port, 5003);
    }

    #[test]
    fn one_request_per_username() {
        let db = Database::open_in_memory().unwrap();
        let bob = Person::new("bob", "10.0.0.2", 5002);
        db.insert_request(RequestDirection::Outgoing, &bob).unwrap();
        assert!(db.insert_request(RequestDirection::Incoming, &bob).is_err());
    }

    #[test]
    fn promote_moves_request_to_contacts() {
        let db = Database::open_in_memory().unwrap();
        let carol = Person::new("carol", "10.0.0.3", 5003);
        db.insert_request(RequestDirection::Incoming, &carol).unwrap();

        db.promote_request(&carol).unwrap();

        assert!(db.list_requests().unwrap().is_empty());
        assert_eq!(db.get_contact("carol").unwrap(), carol);
        assert!(!db.delete_request("carol").unwrap());
    }

    #[test]
    fn update_request_address_rewrites_row() {
        let db = Database::open_in_memory().unwrap();
        db.insert_request(RequestDirection::Incoming, &Person::new("carol", "10.0.0.3", 5003))
            .unwrap();

        let moved = Person::new("carol", "10.0.0.30", 6003);
        db.update_request_address(&moved).unwrap();
        let requests = db.list_requests().unwrap();
        assert_eq!(requests[0].person, moved);
        assert_eq!(requests[0].direction, RequestDirection::Incoming);

        assert!(matches!(
            db.update_request_address(&Person::new("dave", "10.0.0.4", 5004)),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.upsert_contact(&Person::new("alice", "10.0.0.1", 5001)).unwrap();
            db.insert_request(RequestDirection::Outgoing, &Person::new("bob", "10.0.0.2", 5002))
                .unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let snapshot = db.load_snapshot().unwrap();
        assert_eq!(snapshot.people.len(), 1);
        assert_eq!(snapshot.requests.len(), 1);
        assert!(snapshot.groups.is_empty());
    }
}
