use chrono::{DateTime, Utc};
use rusqlite::params;

use dollclub_shared::documents::AccountRole;
use dollclub_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::CachedProfile;

impl Database {
    /// Store or refresh the local copy of a user document.
    pub fn upsert_profile(&self, profile: &CachedProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (user_id, display_name, avatar_url, diamonds, role, banned, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 avatar_url   = excluded.avatar_url,
                 diamonds     = excluded.diamonds,
                 role         = excluded.role,
                 banned       = excluded.banned,
                 updated_at   = excluded.updated_at",
            params![
                profile.user_id.0,
                profile.display_name,
                profile.avatar_url,
                profile.diamonds as i64,
                role_to_str(profile.role),
                profile.banned,
                profile.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &UserId) -> Result<CachedProfile> {
        self.conn()
            .query_row(
                "SELECT user_id, display_name, avatar_url, diamonds, role, banned, updated_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id.0],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

fn role_to_str(role: AccountRole) -> &'static str {
    match role {
        AccountRole::Member => "member",
        AccountRole::Host => "host",
        AccountRole::Admin => "admin",
    }
}

fn role_from_str(s: &str) -> AccountRole {
    match s {
        "host" => AccountRole::Host,
        "admin" => AccountRole::Admin,
        _ => AccountRole::Member,
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedProfile> {
    let user_id: String = row.get(0)?;
    let display_name: Option<String> = row.get(1)?;
    let avatar_url: Option<String> = row.get(2)?;
    let diamonds: i64 = row.get(3)?;
    let role: String = row.get(4)?;
    let banned: bool = row.get(5)?;
    let ts_str: String = row.get(6)?;

    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(CachedProfile {
        user_id: UserId(user_id),
        display_name,
        avatar_url,
        diamonds: diamonds.max(0) as u64,
        role: role_from_str(&role),
        banned,
        updated_at,
    })
}
