use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{connection::Database, helpers::parse_enum},
    models::Profile,
};

impl Database {
    pub async fn load_profile(&self) -> Result<Option<Profile>> {
        self.execute(|conn| {
            let row = conn
                .query_row(
                    "SELECT display_name, insulin_delivery_method FROM profile WHERE slot = 1",
                    [],
                    |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            match row {
                Some((display_name, method)) => Ok(Some(Profile {
                    display_name,
                    insulin_delivery_method: parse_enum(&method, "insulin_delivery_method")?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn store_profile(&self, profile: &Profile) -> Result<()> {
        let record = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO profile (slot, display_name, insulin_delivery_method, updated_at)
                 VALUES (1, ?1, ?2, ?3)",
                params![
                    record.display_name,
                    record.insulin_delivery_method.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}
