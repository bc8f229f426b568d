//! Local copy of the remote search index.
//!
//! Uses LMDB (via heed) for key-value storage with ACID guarantees. Two
//! named databases live in one environment: `entries` holds JSON index
//! records keyed by `group|artifact|version`, `meta` holds the remote
//! binding and the recorded synchronization state. LMDB iterates `entries`
//! in key order, which is the order search results are returned in.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ENTRIES_DB: &str = "entries";
pub const META_DB: &str = "meta";

const STORE_FILE: &str = "store.lmdb";
const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 8;

const META_REPOSITORY_URL: &str = "repository-url";
const META_CHAIN_ID: &str = "chain-id";
const META_TIMESTAMP: &str = "timestamp";
const META_LAST_INCREMENTAL: &str = "last-incremental";

/// Timestamp layout shared by the remote descriptor and the recorded state.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%.3f %z";

type StrDb = Database<Str, Str>;

/// One artifact as published in the index. Every scalar is optional; the
/// publisher omits fields it has no value for and a reader must cope.
/// `classnames` is the raw newline-delimited class-path blob
/// (`/com/foo/Bar` form) exactly as published.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexRecord {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub packaging: Option<String>,
    #[serde(default)]
    pub classnames: Option<String>,
    /// Incremental chunks mark removed artifacts instead of omitting them.
    #[serde(default)]
    pub deleted: bool,
}

impl IndexRecord {
    /// Store key carrying the record's identity. Absent identity fields
    /// collapse to empty segments so the key stays well-formed.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.group_id.as_deref().unwrap_or(""),
            self.artifact_id.as_deref().unwrap_or(""),
            self.version.as_deref().unwrap_or("")
        )
    }
}

/// Synchronization state recorded after a successful pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub chain_id: String,
    pub timestamp: DateTime<Utc>,
    pub last_incremental: Option<u64>,
}

#[derive(Debug)]
pub struct IndexStore {
    env: Env,
    entries: StrDb,
    meta: StrDb,
    cache_dir: PathBuf,
    index_dir: PathBuf,
    repository_url: String,
}

impl IndexStore {
    /// Opens (creating if needed) the store under `index_dir`, with raw
    /// downloads living in `cache_dir`, bound to `repository_url`. A store
    /// previously bound to a different remote is reclaimed: entries and
    /// recorded state are cleared so the next pass performs a full update.
    pub fn open(cache_dir: &Path, index_dir: &Path, repository_url: &str) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
        std::fs::create_dir_all(index_dir)
            .with_context(|| format!("Failed to create index directory: {}", index_dir.display()))?;

        let env = open_env(&index_dir.join(STORE_FILE))?;

        let mut wtxn = env.write_txn()?;
        let entries = env.create_database::<Str, Str>(&mut wtxn, Some(ENTRIES_DB))?;
        let meta = env.create_database::<Str, Str>(&mut wtxn, Some(META_DB))?;

        let bound = meta.get(&wtxn, META_REPOSITORY_URL)?.map(str::to_string);
        match bound.as_deref() {
            Some(url) if url != repository_url => {
                warn!("Index store was bound to {url}, reclaiming it for {repository_url}");
                entries.clear(&mut wtxn)?;
                meta.clear(&mut wtxn)?;
                meta.put(&mut wtxn, META_REPOSITORY_URL, repository_url)?;
            }
            Some(_) => {}
            None => {
                meta.put(&mut wtxn, META_REPOSITORY_URL, repository_url)?;
            }
        }
        wtxn.commit()?;

        Ok(Self {
            env,
            entries,
            meta,
            cache_dir: cache_dir.to_path_buf(),
            index_dir: index_dir.to_path_buf(),
            repository_url: repository_url.to_string(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    /// The recorded synchronization state, or `None` for a store that has
    /// never completed a pass.
    pub fn sync_state(&self) -> Result<Option<SyncState>> {
        let rtxn = self.env.read_txn()?;
        let Some(chain_id) = self.meta.get(&rtxn, META_CHAIN_ID)?.map(str::to_string) else {
            return Ok(None);
        };
        let Some(raw_timestamp) = self.meta.get(&rtxn, META_TIMESTAMP)? else {
            return Ok(None);
        };
        let timestamp = parse_timestamp(raw_timestamp)?;
        let last_incremental = self
            .meta
            .get(&rtxn, META_LAST_INCREMENTAL)?
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("Failed to parse recorded incremental counter")?;

        Ok(Some(SyncState {
            chain_id,
            timestamp,
            last_incremental,
        }))
    }

    pub fn set_sync_state(&self, state: &SyncState) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.meta.put(&mut wtxn, META_CHAIN_ID, &state.chain_id)?;
        self.meta
            .put(&mut wtxn, META_TIMESTAMP, &format_timestamp(&state.timestamp))?;
        match state.last_incremental {
            Some(counter) => {
                self.meta
                    .put(&mut wtxn, META_LAST_INCREMENTAL, &counter.to_string())?;
            }
            None => {
                self.meta.delete(&mut wtxn, META_LAST_INCREMENTAL)?;
            }
        }
        wtxn.commit()?;
        Ok(())
    }

    /// Applies one decoded chunk in a single write transaction, so readers
    /// never observe a half-applied chunk. `rebuild` clears existing entries
    /// first. Returns how many records were stored and removed.
    pub fn apply_chunk<I>(&self, records: I, rebuild: bool) -> Result<(usize, usize)>
    where
        I: IntoIterator<Item = Result<IndexRecord>>,
    {
        let mut wtxn = self.env.write_txn()?;
        if rebuild {
            self.entries.clear(&mut wtxn)?;
        }

        let mut stored = 0usize;
        let mut removed = 0usize;
        for record in records {
            let record = record?;
            let key = record.key();
            if record.deleted {
                if self.entries.delete(&mut wtxn, &key)? {
                    removed += 1;
                }
            } else {
                let payload = serde_json::to_string(&record)?;
                self.entries.put(&mut wtxn, &key, &payload)?;
                stored += 1;
            }
        }
        wtxn.commit()?;
        Ok((stored, removed))
    }

    /// Every stored record, in key order.
    pub fn records(&self) -> Result<Vec<IndexRecord>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for item in self.entries.iter(&rtxn)? {
            let (key, payload) = item?;
            let record = serde_json::from_str(payload)
                .with_context(|| format!("Failed to decode index record: {key}"))?;
            out.push(record);
        }
        Ok(out)
    }

    pub fn entry_count(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        table_len(&self.entries, &rtxn)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let entries = self.entry_count()?;
        let state = self.sync_state()?;
        Ok(StoreStats {
            index_dir: self.index_dir.to_string_lossy().to_string(),
            cache_dir: self.cache_dir.to_string_lossy().to_string(),
            repository_url: self.repository_url.clone(),
            entries,
            chain_id: state.as_ref().map(|s| s.chain_id.clone()),
            timestamp: state.as_ref().map(|s| format_timestamp(&s.timestamp)),
            last_incremental: state.as_ref().and_then(|s| s.last_incremental),
        })
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .with_context(|| format!("Failed to parse index timestamp: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn open_env(store_path: &Path) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: We do not use NO_LOCK and keep default LMDB locking guarantees.
    // NO_SUB_DIR keeps the store as a single file under the index directory.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options
            .open(store_path)
            .with_context(|| format!("Failed to create/open index store: {}", store_path.display()))
    }
}

fn table_len(db: &StrDb, rtxn: &RoTxn<'_>) -> Result<u64> {
    let mut count = 0u64;
    for item in db.iter(rtxn)? {
        let _ = item?;
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, serde::Serialize)]
pub struct StoreStats {
    pub index_dir: String,
    pub cache_dir: String,
    pub repository_url: String,
    pub entries: u64,
    pub chain_id: Option<String>,
    pub timestamp: Option<String>,
    pub last_incremental: Option<u64>,
}
