use std::path::Path;

use log::info;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::speaker::errors::SpeakerError;
use crate::speaker::models::Speaker;

/// Durable tier of the speaker directory.
pub trait SpeakerStore: Send + Sync {
    fn load(&self, id: i64) -> Result<Option<Speaker>, SpeakerError>;
    fn save(&self, speaker: &Speaker) -> Result<(), SpeakerError>;
}

pub struct SqliteSpeakerStore {
    conn: Mutex<Connection>,
}

impl SqliteSpeakerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SpeakerError> {
        let conn = Connection::open(&path)?;
        Self::migrate(&conn)?;
        info!("Speaker store opened at {:?}", path.as_ref());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, SpeakerError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), SpeakerError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl SpeakerStore for SqliteSpeakerStore {
    fn load(&self, id: i64) -> Result<Option<Speaker>, SpeakerError> {
        let query = "SELECT id, name FROM user WHERE id = ?1";
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(query)?;
        let result = stmt.query_row([id], |row| {
            Ok(Speaker::new(row.get(0)?, row.get::<_, String>(1)?))
        });

        match result {
            Ok(speaker) => Ok(Some(speaker)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, speaker: &Speaker) -> Result<(), SpeakerError> {
        // names are never re-fetched, so an existing row wins
        let query = "INSERT OR IGNORE INTO user (id, name) VALUES (?1, ?2)";
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(query)?;
        stmt.execute(params![speaker.id, speaker.name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_row_is_none() {
        let store = SqliteSpeakerStore::in_memory().unwrap();
        assert!(store.load(42).unwrap().is_none());
    }

    #[test]
    fn saved_speaker_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.sqlite");

        {
            let store = SqliteSpeakerStore::open(&path).unwrap();
            store.save(&Speaker::new(12345, "alice")).unwrap();
        }

        let store = SqliteSpeakerStore::open(&path).unwrap();
        assert_eq!(store.load(12345).unwrap(), Some(Speaker::new(12345, "alice")));
    }

    #[test]
    fn second_save_keeps_first_name() {
        let store = SqliteSpeakerStore::in_memory().unwrap();
        store.save(&Speaker::new(7, "first")).unwrap();
        store.save(&Speaker::new(7, "second")).unwrap();

        assert_eq!(store.load(7).unwrap().unwrap().name, "first");
    }
}
