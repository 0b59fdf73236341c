//! Detail-page enrichment pass.
//!
//! The group index is loaded first and applied to every record. The pass then
//! walks the record set in base order, one identifier at a time, loading each
//! detail page under the retry policy. Consecutive fully-failed identifiers
//! trip the circuit breaker, after which the host gets no further requests.
//! The session is always closed.

use tracing::{error, info, instrument, warn};

use companyinfo_shared::{DetailConfig, SecurityId};
use companyinfo_sources::DetailSource;

use crate::records::{RecordPatch, RecordSet};
use crate::resilience::{CircuitBreaker, RetryPolicy, with_retry};

/// Outcome counters for one detail pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    /// Identifiers whose page was requested.
    pub attempted: usize,
    /// Identifiers that yielded at least one field.
    pub succeeded: usize,
    pub failed: usize,
    /// Identifiers never requested because the breaker opened.
    pub skipped: usize,
    pub aborted: bool,
    /// Records that received a group affiliation.
    pub grouped: usize,
}

/// Run the detail pass and the group-index pass, then close the source.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn enrich_details<D: DetailSource>(
    records: &mut RecordSet,
    source: &D,
    config: &DetailConfig,
    progress: &dyn EnrichmentProgress,
) -> EnrichmentStats {
    progress.phase("Mapping business groups");
    let groups = source.group_map().await;
    let mut grouped = 0;
    let ids: Vec<SecurityId> = records.ids().cloned().collect();
    for id in ids {
        if let Some(names) = groups.get(&id) {
            records.apply(RecordPatch::groups(id, names.clone()));
            grouped += 1;
        }
    }

    progress.phase("Fetching detail pages");
    let mut stats = fetch_details(records, source, config, progress).await;
    stats.grouped = grouped;

    source.close().await;

    info!(
        attempted = stats.attempted,
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        aborted = stats.aborted,
        grouped = stats.grouped,
        "detail enrichment finished"
    );
    stats
}

async fn fetch_details<D: DetailSource>(
    records: &mut RecordSet,
    source: &D,
    config: &DetailConfig,
    progress: &dyn EnrichmentProgress,
) -> EnrichmentStats {
    let ids: Vec<SecurityId> = records.ids().cloned().collect();
    let total = ids.len();
    let policy = RetryPolicy::detail(config);
    let mut breaker = CircuitBreaker::new(config.failure_threshold);
    let mut stats = EnrichmentStats::default();

    for (i, id) in ids.iter().enumerate() {
        if breaker.is_open() {
            stats.aborted = true;
            stats.skipped = total - i;
            error!(
                consecutive_failures = breaker.consecutive_failures(),
                remaining = stats.skipped,
                "too many consecutive detail failures, stopping page loads"
            );
            break;
        }

        progress.task_progress(i + 1, total, id.as_str());
        stats.attempted += 1;

        match with_retry(&policy, move || source.fetch_detail(id)).await {
            Ok(fields) if !fields.is_empty() => {
                breaker.record_success();
                stats.succeeded += 1;
                records.apply(RecordPatch::from_detail(id.clone(), fields));
            }
            Ok(_) => {
                breaker.record_failure();
                stats.failed += 1;
                warn!(id = %id, "detail page yielded no fields");
            }
            Err(e) => {
                breaker.record_failure();
                stats.failed += 1;
                warn!(id = %id, error = %e, "detail fetch failed");
            }
        }

        if i + 1 < total && !breaker.is_open() {
            tokio::time::sleep(config.polite_delay()).await;
        }
    }

    stats
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for the enrichment passes.
pub trait EnrichmentProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Item-level progress within the current phase.
    fn task_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
