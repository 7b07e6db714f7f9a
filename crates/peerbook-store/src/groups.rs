use chrono::Utc;
use rusqlite::params;

use peerbook_shared::Group;

use crate::contacts::row_to_person;
use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Store a group and its member snapshot in one transaction.
    pub fn create_group(&self, group: &Group) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO groups (name, created_at) VALUES (?1, ?2)",
            params![group.name, Utc::now().to_rfc3339()],
        )?;
        for member in group.members() {
            tx.execute(
                "INSERT INTO group_members (group_name, username, address, port)
                 VALUES (?1, ?2, ?3, ?4)",
                params![group.name, member.username, member.address, member.port],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let names: Vec<String> = {
            let mut stmt = self
                .conn()
                .prepare("SELECT name FROM groups ORDER BY name ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut stmt = self.conn().prepare(
            "SELECT username, address, port FROM group_members
             WHERE group_name = ?1 ORDER BY username ASC",
        )?;
        names
            .into_iter()
            .map(|name| {
                let members = stmt
                    .query_map(params![name], row_to_person)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(StoreError::Sqlite)?;
                Ok(Group::new(name, members))
            })
            .collect()
    }
}
