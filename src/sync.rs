//! Synchronization of the local store against the remote descriptor.
//!
//! One pass fetches `index.properties`, compares it with the recorded state
//! and applies nothing (already current), every missing incremental chunk
//! (stale but coverable), or a full rebuild (fresh store, new chain, or a
//! counter gap the remote no longer covers). Chunks are gzip-compressed
//! JSON lines; the raw downloads land in the cache directory before being
//! decoded and applied.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::fetch::ResourceFetcher;
use crate::store::{format_timestamp, parse_timestamp, IndexRecord, IndexStore, SyncState};

pub const DESCRIPTOR_RESOURCE: &str = "index.properties";
pub const FULL_CHUNK_RESOURCE: &str = "index.gz";

const PROP_CHAIN_ID: &str = "index.chain-id";
const PROP_TIMESTAMP: &str = "index.timestamp";
const PROP_LAST_INCREMENTAL: &str = "index.last-incremental";
const PROP_INCREMENTAL_PREFIX: &str = "index.incremental-";

/// Outcome of one synchronization pass. Informational only; every outcome
/// leaves the store queryable.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Full,
    Unchanged,
    Incremental {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Remote state advertised by `index.properties`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDescriptor {
    pub chain_id: String,
    pub timestamp: DateTime<Utc>,
    pub last_incremental: Option<u64>,
    pub incrementals: BTreeSet<u64>,
}

impl RemoteDescriptor {
    /// Parses the java-properties style descriptor. Unknown keys are
    /// ignored; a missing chain id or timestamp is an error because the
    /// update decision cannot be made without them.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut chain_id = None;
        let mut timestamp = None;
        let mut last_incremental = None;
        let mut incrementals = BTreeSet::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                PROP_CHAIN_ID => chain_id = Some(value.to_string()),
                PROP_TIMESTAMP => timestamp = Some(parse_timestamp(value)?),
                PROP_LAST_INCREMENTAL => {
                    last_incremental = Some(parse_counter(value)?);
                }
                _ if key.starts_with(PROP_INCREMENTAL_PREFIX) => {
                    incrementals.insert(parse_counter(value)?);
                }
                _ => {}
            }
        }

        Ok(Self {
            chain_id: chain_id.ok_or_else(|| anyhow!("Descriptor is missing {PROP_CHAIN_ID}"))?,
            timestamp: timestamp
                .ok_or_else(|| anyhow!("Descriptor is missing {PROP_TIMESTAMP}"))?,
            last_incremental,
            incrementals,
        })
    }

    pub fn incremental_resource(counter: u64) -> String {
        format!("index.{counter}.gz")
    }
}

fn parse_counter(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("Invalid incremental counter: {value}"))
}

/// What one pass has to do, decided purely from local and remote state.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePlan {
    Full,
    None,
    Incremental(Vec<u64>),
}

/// Decides the update plan. Incremental is chosen only when the remote still
/// advertises every counter between the recorded one and its latest;
/// anything else that is not plainly current falls back to a full rebuild.
pub fn plan_update(local: Option<&SyncState>, remote: &RemoteDescriptor) -> UpdatePlan {
    let Some(local) = local else {
        return UpdatePlan::Full;
    };
    if local.chain_id != remote.chain_id {
        return UpdatePlan::Full;
    }
    if local.timestamp == remote.timestamp {
        return UpdatePlan::None;
    }
    let (Some(have), Some(want)) = (local.last_incremental, remote.last_incremental) else {
        return UpdatePlan::Full;
    };
    if want <= have {
        // The remote moved without advancing its counter; the recorded
        // window no longer means anything.
        return UpdatePlan::Full;
    }
    let needed: Vec<u64> = (have + 1..=want).collect();
    if needed.iter().all(|c| remote.incrementals.contains(c)) {
        UpdatePlan::Incremental(needed)
    } else {
        UpdatePlan::Full
    }
}

/// Runs one synchronization pass against the store's remote.
pub fn synchronize(store: &IndexStore, fetcher: &dyn ResourceFetcher) -> Result<UpdateOutcome> {
    info!("Updating index...");
    let descriptor_path = store.cache_dir().join(DESCRIPTOR_RESOURCE);
    fetcher
        .fetch(DESCRIPTOR_RESOURCE, &descriptor_path)
        .context("Failed to fetch the index descriptor")?;
    let raw = std::fs::read_to_string(&descriptor_path)
        .with_context(|| format!("Failed to read {}", descriptor_path.display()))?;
    let remote = RemoteDescriptor::parse(&raw)?;

    let local = store.sync_state()?;
    match plan_update(local.as_ref(), &remote) {
        UpdatePlan::None => {
            info!("No update needed");
            Ok(UpdateOutcome::Unchanged)
        }
        UpdatePlan::Full => {
            apply_resource(store, fetcher, FULL_CHUNK_RESOURCE, true)?;
            store.set_sync_state(&SyncState {
                chain_id: remote.chain_id.clone(),
                timestamp: remote.timestamp,
                last_incremental: remote.last_incremental,
            })?;
            info!("Full update done");
            Ok(UpdateOutcome::Full)
        }
        UpdatePlan::Incremental(counters) => {
            let Some(local) = local else {
                anyhow::bail!("Incremental plan without recorded local state");
            };
            for counter in &counters {
                let resource = RemoteDescriptor::incremental_resource(*counter);
                apply_resource(store, fetcher, &resource, false)?;
            }
            store.set_sync_state(&SyncState {
                chain_id: remote.chain_id.clone(),
                timestamp: remote.timestamp,
                last_incremental: remote.last_incremental,
            })?;
            info!(
                "Incremental update done: {} to {}",
                format_timestamp(&local.timestamp),
                format_timestamp(&remote.timestamp)
            );
            Ok(UpdateOutcome::Incremental {
                from: local.timestamp,
                to: remote.timestamp,
            })
        }
    }
}

/// Fetches one chunk into the cache directory, verifies it against its
/// published checksum when the remote has one, then decodes and applies it.
fn apply_resource(
    store: &IndexStore,
    fetcher: &dyn ResourceFetcher,
    resource: &str,
    rebuild: bool,
) -> Result<()> {
    let chunk_path = store.cache_dir().join(resource);
    fetcher
        .fetch(resource, &chunk_path)
        .with_context(|| format!("Failed to fetch index chunk {resource}"))?;
    verify_checksum(fetcher, resource, &chunk_path, store.cache_dir())?;

    let file = File::open(&chunk_path)
        .with_context(|| format!("Failed to open {}", chunk_path.display()))?;
    let reader = BufReader::new(GzDecoder::new(BufReader::new(file)));
    let records = reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(
            serde_json::from_str::<IndexRecord>(&line)
                .with_context(|| format!("Invalid index record in {resource}")),
        ),
        Err(err) => Some(Err(anyhow::Error::from(err))),
    });

    let (stored, removed) = store
        .apply_chunk(records, rebuild)
        .with_context(|| format!("Failed to apply index chunk {resource}"))?;
    debug!("Applied {resource}: {stored} stored, {removed} removed");
    Ok(())
}

fn verify_checksum(
    fetcher: &dyn ResourceFetcher,
    resource: &str,
    chunk_path: &Path,
    cache_dir: &Path,
) -> Result<()> {
    let checksum_resource = format!("{resource}.sha256");
    let checksum_path = cache_dir.join(&checksum_resource);
    if !fetcher.fetch_optional(&checksum_resource, &checksum_path)? {
        return Ok(());
    }

    let published = std::fs::read_to_string(&checksum_path)
        .with_context(|| format!("Failed to read {}", checksum_path.display()))?;
    // Coreutils-style checksum files carry "<hex>  <name>"; only the digest
    // matters here.
    let expected = published.split_whitespace().next().unwrap_or("");
    let actual = file_sha256_hex(chunk_path)?;
    if !expected.eq_ignore_ascii_case(&actual) {
        anyhow::bail!("Checksum mismatch for {resource}: expected {expected}, got {actual}");
    }
    debug!("Verified checksum of {resource}");
    Ok(())
}

fn file_sha256_hex(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(chain: &str, ts: &str, last: Option<u64>, counters: &[u64]) -> RemoteDescriptor {
        RemoteDescriptor {
            chain_id: chain.to_string(),
            timestamp: parse_timestamp(ts).unwrap(),
            last_incremental: last,
            incrementals: counters.iter().copied().collect(),
        }
    }

    fn local(chain: &str, ts: &str, last: Option<u64>) -> SyncState {
        SyncState {
            chain_id: chain.to_string(),
            timestamp: parse_timestamp(ts).unwrap(),
            last_incremental: last,
        }
    }

    const TS_OLD: &str = "20260815101530.123 +0000";
    const TS_NEW: &str = "20260816093012.456 +0000";

    #[test]
    fn descriptor_parse_reads_all_advertised_state() -> Result<()> {
        let raw = "#index descriptor\n\
                   index.id=central\n\
                   index.chain-id=1690000000000\n\
                   index.timestamp=20260815101530.123 +0000\n\
                   index.last-incremental=7\n\
                   index.incremental-0=6\n\
                   index.incremental-1=7\n";
        let parsed = RemoteDescriptor::parse(raw)?;
        assert_eq!(parsed.chain_id, "1690000000000");
        assert_eq!(format_timestamp(&parsed.timestamp), TS_OLD);
        assert_eq!(parsed.last_incremental, Some(7));
        assert_eq!(parsed.incrementals, BTreeSet::from([6, 7]));
        Ok(())
    }

    #[test]
    fn descriptor_parse_ignores_comments_blanks_and_unknown_keys() -> Result<()> {
        let raw = "# comment\n\n\
                   not a property line\n\
                   index.mystery=thing\n\
                   index.chain-id = abc \n\
                   index.timestamp = 20260815101530.123 +0000\n";
        let parsed = RemoteDescriptor::parse(raw)?;
        assert_eq!(parsed.chain_id, "abc");
        assert_eq!(parsed.last_incremental, None);
        assert!(parsed.incrementals.is_empty());
        Ok(())
    }

    #[test]
    fn descriptor_parse_requires_chain_and_timestamp() {
        assert!(RemoteDescriptor::parse("index.timestamp=20260815101530.123 +0000\n").is_err());
        assert!(RemoteDescriptor::parse("index.chain-id=abc\n").is_err());
        assert!(RemoteDescriptor::parse("index.chain-id=abc\nindex.timestamp=garbage\n").is_err());
    }

    #[test]
    fn fresh_store_plans_a_full_update() {
        let plan = plan_update(None, &remote("abc", TS_NEW, Some(3), &[1, 2, 3]));
        assert_eq!(plan, UpdatePlan::Full);
    }

    #[test]
    fn matching_timestamp_plans_no_update() {
        let state = local("abc", TS_NEW, Some(3));
        let plan = plan_update(Some(&state), &remote("abc", TS_NEW, Some(3), &[1, 2, 3]));
        assert_eq!(plan, UpdatePlan::None);
    }

    #[test]
    fn chain_change_plans_a_full_update() {
        let state = local("abc", TS_OLD, Some(3));
        let plan = plan_update(Some(&state), &remote("def", TS_NEW, Some(4), &[3, 4]));
        assert_eq!(plan, UpdatePlan::Full);
    }

    #[test]
    fn covered_counter_window_plans_incrementals_in_order() {
        let state = local("abc", TS_OLD, Some(3));
        let plan = plan_update(Some(&state), &remote("abc", TS_NEW, Some(6), &[3, 4, 5, 6]));
        assert_eq!(plan, UpdatePlan::Incremental(vec![4, 5, 6]));
    }

    #[test]
    fn counter_gap_plans_a_full_update() {
        let state = local("abc", TS_OLD, Some(3));
        let plan = plan_update(Some(&state), &remote("abc", TS_NEW, Some(6), &[5, 6]));
        assert_eq!(plan, UpdatePlan::Full);
    }

    #[test]
    fn missing_counters_on_either_side_plan_a_full_update() {
        let state = local("abc", TS_OLD, None);
        let plan = plan_update(Some(&state), &remote("abc", TS_NEW, Some(6), &[5, 6]));
        assert_eq!(plan, UpdatePlan::Full);

        let state = local("abc", TS_OLD, Some(3));
        let plan = plan_update(Some(&state), &remote("abc", TS_NEW, None, &[]));
        assert_eq!(plan, UpdatePlan::Full);
    }

    #[test]
    fn stale_remote_counter_plans_a_full_update() {
        let state = local("abc", TS_OLD, Some(6));
        let plan = plan_update(Some(&state), &remote("abc", TS_NEW, Some(6), &[5, 6]));
        assert_eq!(plan, UpdatePlan::Full);
    }

    #[test]
    fn incremental_resources_are_named_by_counter() {
        assert_eq!(RemoteDescriptor::incremental_resource(17), "index.17.gz");
    }
}
