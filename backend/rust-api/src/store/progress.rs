use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::to_millis;
use crate::error::StoreResult;
use crate::models::progress::{CategoryStat, GlossaryEntry};
use crate::rules::FAILURE_COOLDOWN;

/// Retire a question for an identity. Returns false when it was already
/// retired.
pub fn insert_solved(conn: &Connection, identity: &str, fingerprint: &str) -> StoreResult<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO solved (identity, fingerprint) VALUES (?1, ?2)",
        params![identity, fingerprint],
    )?;
    Ok(changed > 0)
}

pub fn solved_count(conn: &Connection, identity: &str) -> StoreResult<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM solved WHERE identity = ?1",
        params![identity],
        |row| row.get(0),
    )?)
}

pub fn insert_failure(
    conn: &Connection,
    identity: &str,
    question_id: i64,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO failures (identity, question_id, failed_at_ms) VALUES (?1, ?2, ?3)",
        params![identity, question_id, to_millis(at)],
    )?;
    Ok(())
}

/// Drop failures whose cooldown has run out. Returns how many went.
pub fn purge_expired_failures(conn: &Connection, now: DateTime<Utc>) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM failures WHERE failed_at_ms <= ?1",
        params![cutoff(now)],
    )?)
}

fn cutoff(now: DateTime<Utc>) -> i64 {
    to_millis(now) - FAILURE_COOLDOWN.as_millis() as i64
}

/// Add one correct answer to a category and return the new count.
pub fn increment_category(conn: &Connection, identity: &str, category: &str) -> StoreResult<u32> {
    conn.execute(
        "INSERT INTO category_stats (identity, category, correct_count) VALUES (?1, ?2, 1) \
         ON CONFLICT(identity, category) DO UPDATE SET correct_count = correct_count + 1",
        params![identity, category],
    )?;
    category_count(conn, identity, category)
}

pub fn category_count(conn: &Connection, identity: &str, category: &str) -> StoreResult<u32> {
    Ok(conn
        .query_row(
            "SELECT correct_count FROM category_stats WHERE identity = ?1 AND category = ?2",
            params![identity, category],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0))
}

/// Merge a remote counter without ever lowering the local one.
pub fn merge_category(
    conn: &Connection,
    identity: &str,
    category: &str,
    correct_count: u32,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO category_stats (identity, category, correct_count) VALUES (?1, ?2, ?3) \
         ON CONFLICT(identity, category) DO UPDATE SET \
            correct_count = MAX(correct_count, excluded.correct_count)",
        params![identity, category, correct_count],
    )?;
    Ok(())
}

pub fn category_stats(conn: &Connection, identity: &str) -> StoreResult<Vec<CategoryStat>> {
    let mut stmt = conn.prepare(
        "SELECT category, correct_count FROM category_stats \
         WHERE identity = ?1 ORDER BY category",
    )?;
    let rows = stmt
        .query_map(params![identity], |row| {
            Ok(CategoryStat {
                category: row.get(0)?,
                correct_count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a glossary term unless the identity already has it.
pub fn insert_glossary(conn: &Connection, identity: &str, entry: &GlossaryEntry) -> StoreResult<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO glossary (identity, term, definition, category) \
         VALUES (?1, ?2, ?3, ?4)",
        params![identity, entry.term, entry.definition, entry.category],
    )?;
    Ok(changed > 0)
}

pub fn glossary(conn: &Connection, identity: &str) -> StoreResult<Vec<GlossaryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT term, definition, category FROM glossary WHERE identity = ?1 ORDER BY term",
    )?;
    let rows = stmt
        .query_map(params![identity], |row| {
            Ok(GlossaryEntry {
                term: row.get(0)?,
                definition: row.get(1)?,
                category: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn glossary_count(conn: &Connection, identity: &str) -> StoreResult<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM glossary WHERE identity = ?1",
        params![identity],
        |row| row.get(0),
    )?)
}

pub fn glossary_entry(
    conn: &Connection,
    identity: &str,
    term: &str,
) -> StoreResult<Option<GlossaryEntry>> {
    Ok(conn
        .query_row(
            "SELECT term, definition, category FROM glossary WHERE identity = ?1 AND term = ?2",
            params![identity, term],
            |row| {
                Ok(GlossaryEntry {
                    term: row.get(0)?,
                    definition: row.get(1)?,
                    category: row.get(2)?,
                })
            },
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use chrono::Duration;

    fn failure_count(conn: &Connection) -> StoreResult<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM failures", [], |row| row.get(0))?)
    }

    #[tokio::test]
    async fn solved_insert_is_idempotent() {
        let store = LocalStore::open_in_memory().unwrap();
        assert!(store
            .write("t", |tx| insert_solved(tx, "id-1", "fp"))
            .await
            .unwrap());
        assert!(!store
            .write("t", |tx| insert_solved(tx, "id-1", "fp"))
            .await
            .unwrap());
        assert_eq!(
            store.read("t", |c| solved_count(c, "id-1")).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn failures_expire_after_retention() {
        let store = LocalStore::open_in_memory().unwrap();
        let failed_at = Utc::now();
        store
            .write("t", move |tx| insert_failure(tx, "id-1", 9, failed_at))
            .await
            .unwrap();

        let soon = failed_at + Duration::hours(23);
        let later = failed_at + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(store.purge_expired_failures(soon).await.unwrap(), 0);
        assert_eq!(store.read("t", failure_count).await.unwrap(), 1);
        assert_eq!(store.purge_expired_failures(later).await.unwrap(), 1);
        assert_eq!(store.read("t", failure_count).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn category_merge_never_lowers() {
        let store = LocalStore::open_in_memory().unwrap();
        for _ in 0..3 {
            store
                .write("t", |tx| increment_category(tx, "id-1", "Transport"))
                .await
                .unwrap();
        }
        store
            .write("t", |tx| merge_category(tx, "id-1", "Transport", 1))
            .await
            .unwrap();
        assert_eq!(
            store
                .read("t", |c| category_count(c, "id-1", "Transport"))
                .await
                .unwrap(),
            3
        );
        store
            .write("t", |tx| merge_category(tx, "id-1", "Transport", 8))
            .await
            .unwrap();
        assert_eq!(
            store
                .read("t", |c| category_count(c, "id-1", "Transport"))
                .await
                .unwrap(),
            8
        );
    }

    #[tokio::test]
    async fn glossary_keeps_first_definition() {
        let store = LocalStore::open_in_memory().unwrap();
        let first = GlossaryEntry {
            term: "Muda".to_string(),
            definition: "Waste".to_string(),
            category: "Lean Strategy".to_string(),
        };
        let second = GlossaryEntry {
            definition: "Something else".to_string(),
            ..first.clone()
        };
        let entry = first.clone();
        assert!(store
            .write("t", move |tx| insert_glossary(tx, "id-1", &entry))
            .await
            .unwrap());
        assert!(!store
            .write("t", move |tx| insert_glossary(tx, "id-1", &second))
            .await
            .unwrap());
        let entries = store.read("t", |c| glossary(c, "id-1")).await.unwrap();
        assert_eq!(entries, vec![first]);
    }
}
