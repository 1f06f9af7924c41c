//! Remote mirror store: the best-effort copy used to rehydrate a learner on a
//! new device. Never consulted for decisions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::ReplaceOptions;
use mongodb::Database;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::mirror::MirrorTable;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace the row matching `key`, inserting it when absent.
    async fn upsert(&self, table: MirrorTable, key: Document, row: Document) -> Result<()>;

    /// Rows whose fields equal every entry of `filter`.
    async fn select(&self, table: MirrorTable, filter: Document) -> Result<Vec<Document>>;
}

pub struct MongoMirror {
    db: Database,
}

impl MongoMirror {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .context("Failed to create MongoDB client")?;
        Ok(Self::new(client.database(database)))
    }
}

#[async_trait]
impl RemoteStore for MongoMirror {
    async fn upsert(&self, table: MirrorTable, key: Document, row: Document) -> Result<()> {
        self.db
            .collection::<Document>(table.name())
            .replace_one(key, row)
            .with_options(ReplaceOptions::builder().upsert(true).build())
            .await
            .with_context(|| format!("Failed to upsert into {}", table.name()))?;
        Ok(())
    }

    async fn select(&self, table: MirrorTable, filter: Document) -> Result<Vec<Document>> {
        let cursor = self
            .db
            .collection::<Document>(table.name())
            .find(filter)
            .await
            .with_context(|| format!("Failed to query {}", table.name()))?;
        let mut rows: Vec<Document> = cursor.try_collect().await?;
        for row in &mut rows {
            row.remove("_id");
        }
        Ok(rows)
    }
}

/// Process-local mirror. Backs tests and runs where no remote is configured
/// but replication paths should still be exercised.
#[derive(Default)]
pub struct InMemoryMirror {
    tables: Mutex<HashMap<MirrorTable, Vec<Document>>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upsert fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent select fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn rows(&self, table: MirrorTable) -> Vec<Document> {
        self.tables
            .lock()
            .map(|tables| tables.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

fn matches(row: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| row.get(field).map(|v| same_value(v, expected)).unwrap_or(false))
}

/// Integers compare by value regardless of BSON width.
fn same_value(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Int32(x), Bson::Int64(y)) | (Bson::Int64(y), Bson::Int32(x)) => i64::from(*x) == *y,
        _ => a == b,
    }
}

#[async_trait]
impl RemoteStore for InMemoryMirror {
    async fn upsert(&self, table: MirrorTable, key: Document, row: Document) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("remote mirror unavailable");
        }
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory mirror lock poisoned"))?;
        let rows = tables.entry(table).or_default();
        match rows.iter_mut().find(|existing| matches(existing, &key)) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Ok(())
    }

    async fn select(&self, table: MirrorTable, filter: Document) -> Result<Vec<Document>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("remote mirror unavailable");
        }
        let tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory mirror lock poisoned"))?;
        Ok(tables
            .get(&table)
            .map(|rows| rows.iter().filter(|row| matches(row, &filter)).cloned().collect())
            .unwrap_or_default())
    }
}
