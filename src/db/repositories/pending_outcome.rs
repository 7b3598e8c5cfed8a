use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Transaction};

use crate::{db::connection::Database, exercise::EndedSession};

fn select_pending(tx: &Transaction<'_>) -> Result<Option<EndedSession>> {
    let payload: Option<String> = tx
        .query_row("SELECT payload FROM pending_outcome WHERE slot = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    payload
        .map(|raw| serde_json::from_str(&raw).context("failed to parse pending outcome payload"))
        .transpose()
}

impl Database {
    pub async fn store_pending_outcome(&self, ended: &EndedSession) -> Result<()> {
        let payload = serde_json::to_string(ended).context("failed to serialize pending outcome")?;
        let session_id = ended.session.id.clone();
        let ended_at = ended.ended_at.to_rfc3339();

        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pending_outcome (slot, session_id, ended_at, payload)
                 VALUES (1, ?1, ?2, ?3)",
                params![session_id, ended_at, payload],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_pending_outcome(&self) -> Result<Option<EndedSession>> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let pending = select_pending(&tx)?;
            tx.commit()?;
            Ok(pending)
        })
        .await
    }

    pub async fn take_pending_outcome(&self) -> Result<Option<EndedSession>> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let pending = select_pending(&tx)?;
            if pending.is_some() {
                tx.execute("DELETE FROM pending_outcome WHERE slot = 1", [])?;
            }
            tx.commit()?;
            Ok(pending)
        })
        .await
    }
}
