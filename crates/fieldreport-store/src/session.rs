use rusqlite::{params, OptionalExtension};

use fieldreport_shared::constants::{SESSION_KEY_PHONE, SESSION_KEY_USER_ID};

use crate::database::Database;
use crate::error::Result;

/// Session values persisted on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub phone: Option<String>,
    pub user_id: Option<String>,
}

impl Database {
    pub fn session_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM session WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn session_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session (key, value, updated_at)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn session_remove(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM session WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    pub fn session_all(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT key, value FROM session ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    pub fn load_session(&self) -> Result<StoredSession> {
        Ok(StoredSession {
            phone: self.session_get(SESSION_KEY_PHONE)?,
            user_id: self.session_get(SESSION_KEY_USER_ID)?,
        })
    }

    /// Persist both keys atomically. A `None` field removes its key.
    pub fn save_session(&self, session: &StoredSession) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;
        for (key, value) in [
            (SESSION_KEY_PHONE, session.phone.as_deref()),
            (SESSION_KEY_USER_ID, session.user_id.as_deref()),
        ] {
            match value {
                Some(v) => self.session_set(key, v)?,
                None => {
                    self.session_remove(key)?;
                }
            }
        }
        tx.commit()?;

        tracing::debug!(
            has_phone = session.phone.is_some(),
            has_user_id = session.user_id.is_some(),
            "session saved"
        );
        Ok(())
    }

    pub fn clear_session(&self) -> Result<()> {
        self.session_remove(SESSION_KEY_PHONE)?;
        self.session_remove(SESSION_KEY_USER_ID)?;
        tracing::debug!("session cleared");
        Ok(())
    }
}
