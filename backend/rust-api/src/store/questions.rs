use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{from_millis, to_millis};
use crate::error::{StoreError, StoreResult};
use crate::models::question::{DifficultyVote, NewQuestion, QuestionOrigin, QuestionRecord};
use crate::rules::{FAILURE_COOLDOWN, MAX_QUESTION_LEVEL};

const COLUMNS: &str = "id, category, concept, level, prompt, options, correct, explanation, \
     theory, example, tip, triad_id, triad_position, origin, created_at_ms";

fn map_row(row: &Row<'_>) -> rusqlite::Result<QuestionRecord> {
    let options_json: String = row.get(5)?;
    let options = serde_json::from_str(&options_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let origin: String = row.get(13)?;
    let origin = origin.parse::<QuestionOrigin>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            13,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;

    Ok(QuestionRecord {
        id: row.get(0)?,
        category: row.get(1)?,
        concept: row.get(2)?,
        level: row.get(3)?,
        prompt: row.get(4)?,
        options,
        correct: row.get(6)?,
        explanation: row.get(7)?,
        theory: row.get(8)?,
        example: row.get(9)?,
        tip: row.get(10)?,
        triad_id: row.get(11)?,
        triad_position: row.get(12)?,
        origin,
        created_at: from_millis(row.get(14)?),
    })
}

/// Validate and insert a question. A question whose prompt fingerprint is
/// already banked is not inserted again; the existing id is returned.
pub fn insert(conn: &Connection, question: NewQuestion, now: DateTime<Utc>) -> StoreResult<i64> {
    let question = question.checked()?;
    let fingerprint = question.fingerprint();
    let options = serde_json::to_string(&question.options)?;

    conn.execute(
        "INSERT OR IGNORE INTO questions (fingerprint, category, concept, level, prompt, options, \
            correct, explanation, theory, example, tip, triad_id, triad_position, origin, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            fingerprint,
            question.category.trim(),
            question.concept,
            question.level,
            question.prompt,
            options,
            question.correct.trim().to_uppercase(),
            question.explanation,
            question.theory,
            question.example,
            question.tip,
            question.triad_id,
            question.triad_position,
            question.origin.as_str(),
            to_millis(now),
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM questions WHERE fingerprint = ?1",
        params![fingerprint],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get(conn: &Connection, id: i64) -> StoreResult<Option<QuestionRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM questions WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], map_row).optional()?)
}

/// Candidate ids inspected per attempt, eligible or not. Bounds the work of
/// one attempt regardless of bank size.
pub const SAMPLE_WINDOW: u32 = 64;

/// Candidate filter for one sampling attempt.
#[derive(Debug, Clone)]
pub struct SampleFilter<'a> {
    pub identity: &'a str,
    pub level: u32,
    pub triad_position: Option<u32>,
    pub exclude_seed: bool,
    pub now: DateTime<Utc>,
    pub limit: u32,
}

/// Smallest and largest id at a level, if any rows exist.
pub fn id_bounds(conn: &Connection, level: u32) -> StoreResult<Option<(i64, i64)>> {
    let lo: Option<i64> = conn.query_row(
        "SELECT MIN(id) FROM questions WHERE level = ?1",
        params![level],
        |row| row.get(0),
    )?;
    let hi: Option<i64> = conn.query_row(
        "SELECT MAX(id) FROM questions WHERE level = ?1",
        params![level],
        |row| row.get(0),
    )?;
    Ok(lo.zip(hi))
}

/// Read up to `filter.limit` eligible rows from a window of
/// [`SAMPLE_WINDOW`] ids starting at `start_id`, wrapping around to the
/// lowest ids when the tail is short. Solved fingerprints, unexpired failures
/// and (when asked) seed rows are dropped from the window.
pub fn sample(
    conn: &Connection,
    filter: &SampleFilter<'_>,
    start_id: i64,
) -> StoreResult<Vec<QuestionRecord>> {
    let window = candidate_ids(conn, filter.level, filter.triad_position, start_id, SAMPLE_WINDOW)?;
    let cutoff = cooldown_cutoff(filter.now);
    let mut stmt = conn.prepare_cached(&eligible_sql())?;

    let mut rows = Vec::new();
    for id in window {
        if rows.len() as u32 >= filter.limit {
            break;
        }
        let row = stmt
            .query_row(
                params![id, filter.exclude_seed, filter.identity, cutoff],
                map_row,
            )
            .optional()?;
        rows.extend(row);
    }
    Ok(rows)
}

/// Ids at a level (and triad position, when given) in id order from
/// `start_id`, then from the lowest id. Reads the index only.
pub fn candidate_ids(
    conn: &Connection,
    level: u32,
    triad_position: Option<u32>,
    start_id: i64,
    window: u32,
) -> StoreResult<Vec<i64>> {
    let mut ids: Vec<i64> = Vec::with_capacity(window as usize);
    for wrapped in [false, true] {
        let remaining = window.saturating_sub(ids.len() as u32);
        if remaining == 0 {
            break;
        }
        let mut stmt = conn.prepare_cached(window_sql(triad_position.is_some(), wrapped))?;
        let batch = match triad_position {
            Some(position) => stmt
                .query_map(params![level, position, start_id, remaining], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?,
            None => stmt
                .query_map(params![level, start_id, remaining], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?,
        };
        ids.extend(batch);
    }
    Ok(ids)
}

fn window_sql(positioned: bool, wrapped: bool) -> &'static str {
    match (positioned, wrapped) {
        (true, false) => {
            "SELECT id FROM questions WHERE level = ?1 AND triad_position = ?2 AND id >= ?3 \
             ORDER BY id LIMIT ?4"
        }
        (true, true) => {
            "SELECT id FROM questions WHERE level = ?1 AND triad_position = ?2 AND id < ?3 \
             ORDER BY id LIMIT ?4"
        }
        (false, false) => {
            "SELECT id FROM questions WHERE level = ?1 AND id >= ?2 ORDER BY id LIMIT ?3"
        }
        (false, true) => "SELECT id FROM questions WHERE level = ?1 AND id < ?2 ORDER BY id LIMIT ?3",
    }
}

fn eligible_sql() -> String {
    format!(
        "SELECT {COLUMNS} FROM questions q \
         WHERE q.id = ?1 \
           AND (?2 = 0 OR q.origin != 'seed') \
           AND NOT EXISTS (SELECT 1 FROM solved s \
                           WHERE s.identity = ?3 AND s.fingerprint = q.fingerprint) \
           AND NOT EXISTS (SELECT 1 FROM failures f \
                           WHERE f.identity = ?3 AND f.question_id = q.id AND f.failed_at_ms > ?4)"
    )
}

fn cooldown_cutoff(now: DateTime<Utc>) -> i64 {
    to_millis(now) - FAILURE_COOLDOWN.as_millis() as i64
}

/// Generated or fallback rows at a level, the pool refill watches.
pub fn count_fresh(conn: &Connection, level: u32) -> StoreResult<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM questions WHERE level = ?1 AND origin != 'seed'",
        params![level],
        |row| row.get(0),
    )?)
}

pub fn count(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?)
}

/// Trim the bank to `max_size`, oldest rows first.
pub fn evict_oldest(conn: &Connection, max_size: u32) -> StoreResult<usize> {
    let total = count(conn)?;
    if total <= max_size {
        return Ok(0);
    }
    let excess = total - max_size;
    let removed = conn.execute(
        "DELETE FROM questions WHERE id IN \
            (SELECT id FROM questions ORDER BY created_at_ms, id LIMIT ?1)",
        params![excess],
    )?;
    conn.execute(
        "DELETE FROM difficulty_votes WHERE question_id NOT IN (SELECT id FROM questions)",
        [],
    )?;
    Ok(removed)
}

/// Count a vote and escalate the question level when enough learners found
/// it hard. Returns (hard, easy, level).
pub fn record_vote(
    conn: &Connection,
    question_id: i64,
    vote: DifficultyVote,
    hard_threshold: u32,
) -> StoreResult<(u32, u32, u32)> {
    let level: u32 = conn
        .query_row(
            "SELECT level FROM questions WHERE id = ?1",
            params![question_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::Invalid(format!("question {} does not exist", question_id)))?;

    let column = match vote {
        DifficultyVote::Hard => "hard_votes",
        DifficultyVote::Easy => "easy_votes",
    };
    conn.execute(
        &format!(
            "INSERT INTO difficulty_votes (question_id, {column}) VALUES (?1, 1) \
             ON CONFLICT(question_id) DO UPDATE SET {column} = {column} + 1"
        ),
        params![question_id],
    )?;

    let (hard, easy): (u32, u32) = conn.query_row(
        "SELECT hard_votes, easy_votes FROM difficulty_votes WHERE question_id = ?1",
        params![question_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if vote == DifficultyVote::Hard && hard >= hard_threshold && level < MAX_QUESTION_LEVEL {
        conn.execute(
            "UPDATE questions SET level = ?2 WHERE id = ?1",
            params![question_id, level + 1],
        )?;
        conn.execute(
            "UPDATE difficulty_votes SET hard_votes = 0 WHERE question_id = ?1",
            params![question_id],
        )?;
        return Ok((0, easy, level + 1));
    }

    Ok((hard, easy, level))
}
