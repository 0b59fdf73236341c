//! End-to-end `run` pipeline: base table → sources → reconcile → enrich →
//! classify → tag → output table.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use companyinfo_shared::{AppConfig, Result};
use companyinfo_sources::{DetailSource, TabularSources, TextClassifier};

use crate::classification::{ClassificationStats, classify_concepts};
use crate::concepts::ConceptTagger;
use crate::enrichment::{EnrichmentProgress, EnrichmentStats, enrich_details};
use crate::reconcile::{self, WeightLookups};
use crate::records::{ColumnLayout, RecordSet};
use crate::table;

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: RecordSet,
    pub layout: ColumnLayout,
    /// Where the output table was written.
    pub output: PathBuf,
    /// `(source name, rows)` for every registry source, empty ones included.
    pub source_rows: Vec<(String, usize)>,
    /// `None` when the detail pass was disabled.
    pub enrichment: Option<EnrichmentStats>,
    /// `None` when classification was disabled.
    pub classification: Option<ClassificationStats>,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Item-level progress within the current phase.
    fn item_progress(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _result: &PipelineResult) {}
}

/// Run the full pipeline.
///
/// 1. Load the base table
/// 2. Fetch registry tables, ETF constituents and index weights
/// 3. Reconcile them onto the base records
/// 4. Detail pages and group index (when `detail` is given and enabled)
/// 5. Batched classification (when `classifier` is given and enabled)
/// 6. Tag concept flags
/// 7. Write the output table
///
/// Source failures degrade to missing values; only base-table and output I/O
/// errors are returned. A given `detail` source is closed on every path.
#[instrument(skip_all, fields(input = %config.paths.input, output = %config.paths.output))]
pub async fn run_pipeline<T, D, C>(
    config: &AppConfig,
    sources: &T,
    detail: Option<&D>,
    classifier: Option<&C>,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult>
where
    T: TabularSources,
    D: DetailSource,
    C: TextClassifier,
{
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    let started_at = Utc::now();
    info!(%run_id, "starting pipeline");

    // --- Phase 1: Base table ---
    progress.phase("Loading base table");
    let loaded = table::read_base(
        Path::new(&config.paths.input),
        &config.paths.id_column,
        &config.paths.name_column,
    );
    let mut records = match loaded {
        Ok(records) => records,
        Err(e) => {
            // The session is owned by the caller but must not outlive the run.
            if let Some(source) = detail {
                source.close().await;
            }
            return Err(e);
        }
    };
    if records.is_empty() {
        warn!("base table has no rows");
    }

    // --- Phase 2: Tabular sources ---
    progress.phase("Fetching registry tables");
    let total = config.registry.sources.len();
    let mut tables = Vec::with_capacity(total);
    for (i, source) in config.registry.sources.iter().enumerate() {
        progress.item_progress(i + 1, total, &source.name);
        let table = sources.registry(source).await;
        info!(source = %source.name, rows = table.len(), "registry table fetched");
        tables.push(table);
    }
    let source_rows = tables
        .iter()
        .map(|t| (t.name().to_string(), t.len()))
        .collect();

    progress.phase("Fetching weights");
    let mut weights = WeightLookups::default();
    for fund in &config.weights.etf_funds {
        let map = sources.etf_weights(fund).await;
        info!(fund = %fund, constituents = map.len(), "ETF weights fetched");
        weights.etf.push((fund.clone(), map));
    }
    weights.index = sources.index_weights().await;
    info!(constituents = weights.index.len(), "index weights fetched");

    // --- Phase 3: Reconcile ---
    progress.phase("Reconciling sources");
    reconcile::merge(&mut records, &tables, &config.reconcile, &weights);

    let enrich_progress = PipelineEnrichmentProgress { inner: progress };

    // --- Phase 4: Detail pages ---
    let enrichment = match detail {
        Some(source) if config.detail.enabled => {
            Some(enrich_details(&mut records, source, &config.detail, &enrich_progress).await)
        }
        Some(source) => {
            info!("detail enrichment disabled");
            source.close().await;
            None
        }
        None => {
            info!("detail enrichment disabled");
            None
        }
    };

    // --- Phase 5: Classification ---
    let classification = match classifier {
        Some(classifier) if config.classification.enabled => Some(
            classify_concepts(
                &mut records,
                classifier,
                &config.classification,
                &enrich_progress,
            )
            .await,
        ),
        _ => {
            info!("concept classification disabled");
            None
        }
    };

    // --- Phase 6: Concept flags ---
    progress.phase("Tagging concepts");
    let tagger = ConceptTagger::new(&config.concepts);
    for record in records.iter_mut() {
        record.concept_flags = tagger.tag(record.related_concepts.as_deref());
    }

    // --- Phase 7: Output ---
    progress.phase("Writing output table");
    let layout = ColumnLayout::new(
        &config.weights.etf_funds,
        tagger.categories(),
        records.extra_columns(),
    );
    let output = PathBuf::from(&config.paths.output);
    table::write_output(&output, &records, &layout, config.paths.write_bom)?;

    let result = PipelineResult {
        run_id,
        started_at,
        records,
        layout,
        output,
        source_rows,
        enrichment,
        classification,
        elapsed: start.elapsed(),
    };

    info!(
        %run_id,
        records = result.records.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "pipeline complete"
    );
    progress.done(&result);
    Ok(result)
}

// ---------------------------------------------------------------------------
// Progress adapter
// ---------------------------------------------------------------------------

/// Bridges `EnrichmentProgress` → `ProgressReporter`.
struct PipelineEnrichmentProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl EnrichmentProgress for PipelineEnrichmentProgress<'_> {
    fn phase(&self, name: &str) {
        self.inner.phase(name);
    }

    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.inner.item_progress(current, total, detail);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use companyinfo_shared::{
        CompanyInfoError, DetailFields, GroupMap, PartialRecord, RegistrySourceConfig,
        SecurityId, SourceTable, WeightMap,
    };

    struct FakeSources;

    impl TabularSources for FakeSources {
        async fn registry(&self, source: &RegistrySourceConfig) -> SourceTable {
            let mut table = SourceTable::new(&source.name);
            match source.name.as_str() {
                "TWSE" => {
                    table.insert(
                        "2330".into(),
                        PartialRecord {
                            market_class: Some("TWSE".into()),
                            industry_class: Some("Semiconductors".into()),
                            ..Default::default()
                        },
                    );
                }
                "Public" => {
                    table.insert(
                        "2330".into(),
                        PartialRecord {
                            market_class: Some("公開發行".into()),
                            industry_class: Some("其他".into()),
                            ..Default::default()
                        },
                    );
                }
                _ => {}
            }
            table
        }

        async fn etf_weights(&self, fund_id: &str) -> WeightMap {
            let mut map = WeightMap::new();
            if fund_id == "0050" {
                map.insert("2330".into(), "47.5".into());
            }
            map
        }

        async fn index_weights(&self) -> WeightMap {
            WeightMap::new()
        }
    }

    #[derive(Default)]
    struct FakeDetail {
        closed: AtomicBool,
    }

    impl DetailSource for FakeDetail {
        async fn fetch_detail(&self, id: &SecurityId) -> Result<DetailFields> {
            match id.as_str() {
                "2330" => Ok(DetailFields {
                    main_business: Some("晶圓代工".into()),
                    related_concepts: Some("輝達概念股".into()),
                    market_cap: None,
                }),
                _ => Err(CompanyInfoError::Network(format!("{id}: HTTP 404"))),
            }
        }

        async fn group_map(&self) -> GroupMap {
            let mut map = GroupMap::new();
            map.insert("2330".into(), "台積電集團".into());
            map
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeClassifier;

    impl TextClassifier for FakeClassifier {
        async fn classify(&self, _prompt: &str) -> Result<String> {
            Ok("StockID, Matched_Concepts\n2330, Apple\n9999, None".into())
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        done: AtomicBool,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
        fn done(&self, _result: &PipelineResult) {
            self.done.store(true, Ordering::SeqCst);
        }
    }

    fn temp_config(input: &str) -> (PathBuf, AppConfig) {
        let dir = std::env::temp_dir().join(format!("companyinfo-pipeline-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let input_path = dir.join("input.csv");
        std::fs::write(&input_path, input).unwrap();

        let mut config = AppConfig::default();
        config.paths.input = input_path.to_string_lossy().into_owned();
        config.paths.output = dir.join("out").join("result.csv").to_string_lossy().into_owned();
        (dir, config)
    }

    /// Output rows as header → value maps.
    fn read_output(path: &Path) -> Vec<HashMap<String, String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                headers.iter().cloned().zip(r.iter().map(String::from)).collect()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_identifier_keeps_null_fields() {
        let (dir, config) = temp_config("代號,名稱\n2330,TSMC\n9999,Unknown\n");
        let detail = FakeDetail::default();
        let progress = RecordingProgress::default();

        let result = run_pipeline(
            &config,
            &FakeSources,
            Some(&detail),
            Some(&FakeClassifier),
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(result.records.len(), 2);
        assert!(detail.closed.load(Ordering::SeqCst));
        assert!(progress.done.load(Ordering::SeqCst));
        assert_eq!(result.source_rows.len(), 4);
        assert_eq!(result.enrichment.as_ref().unwrap().succeeded, 1);
        assert_eq!(result.classification.as_ref().unwrap().matched, 1);

        let rows = read_output(&result.output);
        assert_eq!(rows.len(), 2);

        let tsmc = &rows[0];
        assert_eq!(tsmc["代號"], "2330");
        assert_eq!(tsmc["市場別"], "TWSE");
        assert_eq!(tsmc["產業別"], "Semiconductors");
        assert_eq!(tsmc["ETF_0050_權重"], "47.5");
        assert_eq!(tsmc["ETF_0056_權重"], "");
        assert_eq!(tsmc["主要業務"], "晶圓代工");
        assert_eq!(tsmc["相關概念"], "輝達概念股;Apple");
        assert_eq!(tsmc["nVidia概念"], "1");
        assert_eq!(tsmc["Apple概念"], "1");
        assert_eq!(tsmc["Google概念"], "0");
        assert_eq!(tsmc["相關集團"], "台積電集團");

        let unknown = &rows[1];
        assert_eq!(unknown["代號"], "9999");
        assert_eq!(unknown["名稱"], "Unknown");
        assert_eq!(unknown["市場別"], "");
        assert_eq!(unknown["產業別"], "");
        assert_eq!(unknown["相關概念"], "");
        assert_eq!(unknown["nVidia概念"], "0");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn disabled_passes_are_skipped() {
        let (dir, mut config) = temp_config("代號,名稱,備註\n0050,元大台灣50,ETF\n");
        config.detail.enabled = false;
        config.paths.write_bom = false;

        let result = run_pipeline(
            &config,
            &FakeSources,
            None::<&FakeDetail>,
            None::<&FakeClassifier>,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(result.enrichment.is_none());
        assert!(result.classification.is_none());
        let text = std::fs::read_to_string(&result.output).unwrap();
        assert!(text.starts_with("代號,名稱,市場別"));
        assert!(text.trim_end().ends_with(",ETF"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_input_is_an_error() {
        let mut config = AppConfig::default();
        config.paths.input = "/nonexistent/companyinfo/input.csv".into();
        let detail = FakeDetail::default();

        let err = run_pipeline(
            &config,
            &FakeSources,
            Some(&detail),
            None::<&FakeClassifier>,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompanyInfoError::Io { .. }));
        assert!(detail.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn blank_base_identifier_fails_before_any_fetch() {
        let (dir, config) = temp_config("代號,名稱
2330,TSMC
,Unnamed
");
        let detail = FakeDetail::default();

        let err = run_pipeline(
            &config,
            &FakeSources,
            Some(&detail),
            None::<&FakeClassifier>,
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CompanyInfoError::Validation { .. }));
        assert!(detail.closed.load(Ordering::SeqCst));
        assert!(!Path::new(&config.paths.output).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn disabled_detail_source_is_still_closed() {
        let (dir, mut config) = temp_config("代號,名稱
2330,TSMC
");
        config.detail.enabled = false;
        let detail = FakeDetail::default();

        let result = run_pipeline(
            &config,
            &FakeSources,
            Some(&detail),
            None::<&FakeClassifier>,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(result.enrichment.is_none());
        assert!(detail.closed.load(Ordering::SeqCst));

        std::fs::remove_dir_all(&dir).ok();
    }
}
