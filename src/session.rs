//! Session lifecycle and the caller-facing search operations.
//!
//! An `IndexSearcher` is cheap to create and owns at most one
//! `IndexSession`: the opened store plus the transfer client, built lazily
//! behind a mutex on first use and shared from then on. Building a session
//! runs a synchronization pass, so a search never runs against a store that
//! has not at least attempted to catch up. A failed build is not cached;
//! the next call starts over, so a transient outage heals by itself.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::fetch::{fetcher_for, ResourceFetcher};
use crate::filter::filter_class_names;
use crate::query::{compile, execute, SearchCriteria};
use crate::store::{IndexStore, StoreStats};
use crate::sync::{synchronize, UpdateOutcome};

/// One search hit. Scalars are `None` where the index has no value.
/// `class_names` is `None` when the search had no class-name criterion and
/// `Some` (possibly empty) when it had one.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchResult {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub class_names: Option<Vec<String>>,
}

/// A constructed session: the synchronized store and its transfer client.
pub struct IndexSession {
    store: IndexStore,
    fetcher: Box<dyn ResourceFetcher>,
    initial_outcome: UpdateOutcome,
}

impl IndexSession {
    fn build(config: &SearchConfig) -> Result<Self> {
        let fetcher = fetcher_for(&config.repository_url, config.timeout)?;
        let store = IndexStore::open(&config.cache_dir, &config.index_dir, &config.repository_url)?;
        let initial_outcome = synchronize(&store, fetcher.as_ref())?;
        Ok(Self {
            store,
            fetcher,
            initial_outcome,
        })
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Runs another synchronization pass against this session's remote.
    pub fn synchronize(&self) -> Result<UpdateOutcome> {
        synchronize(&self.store, self.fetcher.as_ref())
    }
}

pub struct IndexSearcher {
    config: SearchConfig,
    session: Mutex<Option<Arc<IndexSession>>>,
}

impl IndexSearcher {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// The shared session, built on first call. Concurrent first calls
    /// serialize on the slot and only one of them builds.
    pub fn session(&self) -> Result<Arc<IndexSession>, SearchError> {
        Ok(self.session_slot()?.0)
    }

    fn session_slot(&self) -> Result<(Arc<IndexSession>, bool), SearchError> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| SearchError::from(anyhow::anyhow!("Session slot lock is poisoned")))?;
        if let Some(session) = slot.as_ref() {
            return Ok((Arc::clone(session), false));
        }
        match IndexSession::build(&self.config) {
            Ok(session) => {
                let session = Arc::new(session);
                *slot = Some(Arc::clone(&session));
                Ok((session, true))
            }
            Err(err) => {
                error!("Failed to build search session: {err:#}");
                Err(err.into())
            }
        }
    }

    /// Searches the index. Absent criteria mean no constraint; an all-absent
    /// set of criteria returns everything the store holds.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<SearchResult>, SearchError> {
        let session = self.session()?;
        search_session(&session, criteria).map_err(SearchError::from)
    }

    /// Forces a synchronization pass. When this call is the one that builds
    /// the session, the build's own pass is the answer and no second pass
    /// runs. Concurrent passes are not deduplicated; the store serializes
    /// their writes.
    pub fn synchronize(&self) -> Result<UpdateOutcome, SearchError> {
        let (session, built) = self.session_slot()?;
        if built {
            return Ok(session.initial_outcome.clone());
        }
        session.synchronize().map_err(SearchError::from)
    }

    pub fn stats(&self) -> Result<StoreStats, SearchError> {
        let session = self.session()?;
        session.store().stats().map_err(SearchError::from)
    }
}

fn search_session(session: &IndexSession, criteria: &SearchCriteria) -> Result<Vec<SearchResult>> {
    let query = compile(criteria)?;
    info!("Received query: {query}");

    let pattern = criteria.class_name_pattern();
    let mut results = Vec::new();
    for record in execute(&query, session.store())? {
        let class_names =
            pattern.map(|p| filter_class_names(record.classnames.as_deref(), Some(p)));
        results.push(SearchResult {
            group_id: record.group_id,
            artifact_id: record.artifact_id,
            version: record.version,
            packaging: record.packaging,
            class_names,
        });
    }
    Ok(results)
}
