use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::fs;

use crate::config::Config;
use crate::models::question::{AuthoredQuestion, QuestionOrigin};
use crate::store::{questions, LocalStore};

const DEFAULT_LEVEL: u32 = 1;
const DEFAULT_CATEGORY: &str = "General";

/// Import the seed file into an empty bank. Returns how many rows went in.
pub async fn bootstrap(config: &Config, store: &LocalStore, now: DateTime<Utc>) -> Result<usize> {
    let path = match &config.bank.seed_file {
        Some(path) if !path.is_empty() => Path::new(path),
        _ => {
            tracing::debug!("No seed file configured, skipping import");
            return Ok(0);
        }
    };

    if !path.exists() {
        tracing::warn!("Seed file {} not found, skipping import", path.display());
        return Ok(0);
    }

    let banked = store.read("count_questions", questions::count).await?;
    if banked > 0 {
        tracing::debug!(banked, "Question bank already populated, seed skipped");
        return Ok(0);
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read seed file")?;
    let imported = import(store, &contents, now).await?;
    tracing::info!(imported, "Seeded question bank from {}", path.display());
    Ok(imported)
}

/// Insert every valid question from a JSON array. Rows that fail ingestion
/// checks are logged and skipped.
pub async fn import(store: &LocalStore, contents: &str, now: DateTime<Utc>) -> Result<usize> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(contents).context("Seed file must hold a JSON array")?;

    let imported = store
        .write("seed_import", move |tx| -> Result<usize> {
            let mut imported = 0;
            for (index, row) in rows.into_iter().enumerate() {
                let authored: AuthoredQuestion = match serde_json::from_value(row) {
                    Ok(authored) => authored,
                    Err(e) => {
                        tracing::warn!(index, "Skipping malformed seed row: {}", e);
                        continue;
                    }
                };
                let question =
                    authored.into_new_question(DEFAULT_LEVEL, DEFAULT_CATEGORY, QuestionOrigin::Seed);
                match questions::insert(tx, question, now) {
                    Ok(_) => imported += 1,
                    Err(crate::error::StoreError::Invalid(reason)) => {
                        tracing::warn!(index, "Skipping invalid seed row: {}", reason);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(imported)
        })
        .await?;
    Ok(imported)
}
