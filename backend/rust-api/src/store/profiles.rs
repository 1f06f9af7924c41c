use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{from_millis, to_millis};
use crate::error::StoreResult;
use crate::models::crisis::ActiveCrisis;
use crate::models::profile::UserProfile;

const COLUMNS: &str = "identity, name, email, level, xp, total_score, mastery, lives, \
     questions_answered, streak, crisis_wins, redemptions, joker_fifty, joker_hint, \
     has_diploma, crisis_active, crisis_started_at_ms, crisis_question_id, last_seen_ms";

fn map_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    let crisis_active: bool = row.get(15)?;
    let started_ms: Option<i64> = row.get(16)?;
    let question_id: Option<i64> = row.get(17)?;
    let crisis = match (crisis_active, started_ms, question_id) {
        (true, Some(ms), Some(qid)) => Some(ActiveCrisis::new(qid, from_millis(ms))),
        _ => None,
    };
    let last_seen: Option<i64> = row.get(18)?;

    Ok(UserProfile {
        identity: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        level: row.get(3)?,
        xp: row.get(4)?,
        total_score: row.get(5)?,
        mastery: row.get(6)?,
        lives: row.get(7)?,
        questions_answered: row.get(8)?,
        streak: row.get(9)?,
        crisis_wins: row.get(10)?,
        redemptions: row.get(11)?,
        joker_fifty: row.get(12)?,
        joker_hint: row.get(13)?,
        has_diploma: row.get(14)?,
        crisis,
        last_seen: last_seen.map(from_millis),
    })
}

/// Write every column of the profile, inserting the row if absent.
pub fn save(conn: &Connection, profile: &UserProfile) -> StoreResult<()> {
    let sql = format!(
        "INSERT INTO profiles ({COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19) \
         ON CONFLICT(identity) DO UPDATE SET \
            name = excluded.name, email = excluded.email, level = excluded.level, \
            xp = excluded.xp, total_score = excluded.total_score, mastery = excluded.mastery, \
            lives = excluded.lives, questions_answered = excluded.questions_answered, \
            streak = excluded.streak, crisis_wins = excluded.crisis_wins, \
            redemptions = excluded.redemptions, joker_fifty = excluded.joker_fifty, \
            joker_hint = excluded.joker_hint, has_diploma = excluded.has_diploma, \
            crisis_active = excluded.crisis_active, \
            crisis_started_at_ms = excluded.crisis_started_at_ms, \
            crisis_question_id = excluded.crisis_question_id, \
            last_seen_ms = excluded.last_seen_ms"
    );

    conn.execute(
        &sql,
        params![
            profile.identity,
            profile.name,
            profile.email,
            profile.level,
            profile.xp,
            profile.total_score,
            profile.mastery,
            profile.lives,
            profile.questions_answered,
            profile.streak,
            profile.crisis_wins,
            profile.redemptions,
            profile.joker_fifty,
            profile.joker_hint,
            profile.has_diploma,
            profile.crisis.is_some(),
            profile.crisis.map(|c| to_millis(c.started_at)),
            profile.crisis.map(|c| c.question_id),
            profile.last_seen.map(to_millis),
        ],
    )?;
    Ok(())
}

pub fn load(conn: &Connection, identity: &str) -> StoreResult<Option<UserProfile>> {
    let sql = format!("SELECT {COLUMNS} FROM profiles WHERE identity = ?1");
    Ok(conn.query_row(&sql, params![identity], map_row).optional()?)
}

pub fn find_by_email(conn: &Connection, email: &str) -> StoreResult<Option<UserProfile>> {
    let sql = format!("SELECT {COLUMNS} FROM profiles WHERE lower(email) = lower(?1)");
    Ok(conn.query_row(&sql, params![email.trim()], map_row).optional()?)
}

/// Profiles with a crisis still marked active.
pub fn in_crisis(conn: &Connection) -> StoreResult<Vec<UserProfile>> {
    let sql = format!("SELECT {COLUMNS} FROM profiles WHERE crisis_active = 1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn touch(conn: &Connection, identity: &str, at: DateTime<Utc>) -> StoreResult<()> {
    conn.execute(
        "UPDATE profiles SET last_seen_ms = ?2 WHERE identity = ?1",
        params![identity, to_millis(at)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    async fn save_copy(store: &LocalStore, profile: &UserProfile) {
        let profile = profile.clone();
        store
            .write("test", move |tx| save(tx, &profile))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn save_and_load_round_trip_keeps_crisis() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut profile = UserProfile::new("id-1", "Ada", "ada@example.com");
        profile.xp = 60;
        profile.crisis = Some(ActiveCrisis::new(
            42,
            DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        ));

        save_copy(&store, &profile).await;
        let loaded = store
            .read("test", |c| load(c, "id-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, profile);

        profile.crisis = None;
        profile.lives = 5;
        save_copy(&store, &profile).await;
        let loaded = store
            .read("test", |c| load(c, "id-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.crisis.is_none());
        assert_eq!(loaded.lives, 5);
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = LocalStore::open_in_memory().unwrap();
        save_copy(&store, &UserProfile::new("id-1", "Ada", "Ada@Example.com")).await;

        let found = store
            .read("test", |c| find_by_email(c, "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.identity), Some("id-1".to_string()));
    }
}
