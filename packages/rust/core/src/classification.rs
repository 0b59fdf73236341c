//! Batched concept classification.
//!
//! `(identifier, name)` pairs are sent in fixed-size batches. A batch that
//! still fails after its retries contributes nothing; the remaining batches
//! carry on.

use std::collections::HashMap;

use tracing::{info, instrument, warn};

use companyinfo_shared::{ClassificationConfig, SecurityId};
use companyinfo_sources::TextClassifier;

use crate::concepts::parse_classification_response;
use crate::enrichment::EnrichmentProgress;
use crate::records::{RecordPatch, RecordSet};
use crate::resilience::{RetryPolicy, with_retry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    pub batches: usize,
    pub batches_ok: usize,
    pub batches_failed: usize,
    /// Identifiers with at least one matched concept.
    pub matched: usize,
}

/// Instruction for one batch.
pub fn build_prompt(targets: &[String], batch: &[(SecurityId, String)]) -> String {
    let stocks = batch
        .iter()
        .map(|(id, name)| format!("{id} {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a financial analyst specializing in Taiwan tech stocks.\n\
         Analyze the following list of companies.\n\
         \n\
         Task: Identify if each company is part of the supply chain or a \"concept stock\" \
         for these specific Tech Giants:\n\
         [{targets}]\n\
         \n\
         Rules:\n\
         1. Only return the names of the Tech Giants from the list above that the company is related to.\n\
         2. If related to multiple, separate with semicolons (e.g., \"Nvidia;Google\").\n\
         3. If not related to any of these specific giants, return \"None\".\n\
         4. Output strictly in CSV format: StockID, Matched_Concepts\n\
         5. Do not output markdown code blocks.\n\
         \n\
         Stocks:\n\
         {stocks}\n",
        targets = targets.join(", "),
    )
}

/// Classify every record and merge the matches into `related_concepts`.
#[instrument(skip_all, fields(records = records.len(), batch_size = config.batch_size))]
pub async fn classify_concepts<C: TextClassifier>(
    records: &mut RecordSet,
    classifier: &C,
    config: &ClassificationConfig,
    progress: &dyn EnrichmentProgress,
) -> ClassificationStats {
    let pairs: Vec<(SecurityId, String)> = records
        .iter()
        .map(|r| (r.id.clone(), r.name.clone()))
        .collect();
    let policy = RetryPolicy::classification(config);
    let batches: Vec<&[(SecurityId, String)]> = pairs.chunks(config.batch_size.max(1)).collect();
    let total = batches.len();
    let mut stats = ClassificationStats {
        batches: total,
        ..Default::default()
    };

    progress.phase("Classifying concepts");
    let mut results: HashMap<SecurityId, String> = HashMap::new();

    for (i, batch) in batches.iter().enumerate() {
        progress.task_progress(i + 1, total, &format!("batch {}/{total}", i + 1));
        let s = build_prompt(&config.targets, batch);
        let prompt = &s;

        match with_retry(&policy, move || classifier.classify(prompt)).await {
            Ok(reply) => {
                stats.batches_ok += 1;
                let parsed = parse_classification_response(&reply);
                info!(batch = i + 1, matched = parsed.len(), "classification batch done");
                // Later batches overwrite earlier answers for the same identifier.
                results.extend(parsed);
                if i + 1 < total {
                    tokio::time::sleep(config.batch_delay()).await;
                }
            }
            Err(e) => {
                stats.batches_failed += 1;
                warn!(batch = i + 1, size = batch.len(), error = %e, "classification batch failed, skipping");
            }
        }
    }

    // Apply in base order so the fold is deterministic.
    for (id, _) in &pairs {
        if let Some(concepts) = results.remove(id) {
            records.apply(RecordPatch::concepts(id.clone(), concepts));
            stats.matched += 1;
        }
    }

    info!(
        batches = stats.batches,
        failed = stats.batches_failed,
        matched = stats.matched,
        "classification finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use companyinfo_shared::{CompanyInfoError, Result};

    use crate::enrichment::SilentEnrichmentProgress;
    use crate::records::BaseRecord;

    /// Replies from a script, one entry per call.
    struct ScriptedClassifier {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClassifier {
        fn new(mut replies: Vec<Result<String>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextClassifier for ScriptedClassifier {
        async fn classify(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(CompanyInfoError::Classification("script exhausted".into())))
        }
    }

    fn records(rows: &[(&str, &str)]) -> RecordSet {
        let rows = rows.iter().map(|(id, name)| BaseRecord::new(*id, *name)).collect();
        RecordSet::from_base(rows, Vec::new()).unwrap()
    }

    fn config(batch_size: usize) -> ClassificationConfig {
        ClassificationConfig {
            batch_size,
            max_attempts: 3,
            ..Default::default()
        }
    }

    #[test]
    fn prompt_lists_targets_and_stocks() {
        let prompt = build_prompt(
            &["Nvidia".into(), "Apple".into()],
            &[("2330".into(), "台積電".into()), ("2317".into(), "鴻海".into())],
        );
        assert!(prompt.contains("[Nvidia, Apple]"));
        assert!(prompt.contains("Stocks:\n2330 台積電\n2317 鴻海\n"));
        assert!(prompt.contains("StockID, Matched_Concepts"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_is_skipped() {
        let mut set = records(&[("2330", "台積電"), ("2317", "鴻海"), ("1101", "台泥")]);
        let classifier = ScriptedClassifier::new(vec![
            Ok("StockID, Matched_Concepts\n2330, Nvidia;Apple\n2317, Nvidia".into()),
            Err(CompanyInfoError::Classification("HTTP 400".into())),
        ]);

        let stats = classify_concepts(&mut set, &classifier, &config(2), &SilentEnrichmentProgress).await;

        assert_eq!(stats.batches, 2);
        assert_eq!(stats.batches_ok, 1);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.matched, 2);
        assert_eq!(
            set.get(&"2330".into()).unwrap().related_concepts.as_deref(),
            Some("Nvidia;Apple")
        );
        assert_eq!(set.get(&"1101".into()).unwrap().related_concepts, None);
        // the terminal failure was not retried
        assert_eq!(classifier.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_delay_between_batches_only() {
        let mut set = records(&[("2330", "台積電"), ("2317", "鴻海"), ("1101", "台泥")]);
        let classifier = ScriptedClassifier::new(vec![
            Ok("2330, Nvidia".into()),
            Ok("2317, None".into()),
            Ok("1101, None".into()),
        ]);
        let cfg = ClassificationConfig {
            batch_delay_ms: 2_000,
            ..config(1)
        };
        let start = tokio::time::Instant::now();

        let stats = classify_concepts(&mut set, &classifier, &cfg, &SilentEnrichmentProgress).await;

        assert_eq!(stats.batches_ok, 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(4) && waited < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn overloaded_batch_is_retried() {
        let mut set = records(&[("2330", "台積電")]);
        let classifier = ScriptedClassifier::new(vec![
            Err(CompanyInfoError::Overloaded("HTTP 503".into())),
            Ok("2330, Nvidia".into()),
        ]);

        let stats = classify_concepts(&mut set, &classifier, &config(40), &SilentEnrichmentProgress).await;

        assert_eq!(stats.batches_ok, 1);
        assert_eq!(classifier.prompts.lock().unwrap().len(), 2);
        assert_eq!(
            set.get(&"2330".into()).unwrap().related_concepts.as_deref(),
            Some("Nvidia")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn results_append_to_scraped_concepts() {
        let mut set = records(&[("2330", "台積電")]);
        set.apply(RecordPatch::concepts("2330".into(), "Nvidia"));
        let classifier = ScriptedClassifier::new(vec![Ok("2330, Nvidia".into())]);

        classify_concepts(&mut set, &classifier, &config(40), &SilentEnrichmentProgress).await;

        assert_eq!(
            set.get(&"2330".into()).unwrap().related_concepts.as_deref(),
            Some("Nvidia;Nvidia")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_identifiers_in_reply_are_ignored() {
        let mut set = records(&[("2330", "台積電")]);
        let classifier = ScriptedClassifier::new(vec![Ok("9999, Nvidia\n2330, None".into())]);

        let stats = classify_concepts(&mut set, &classifier, &config(40), &SilentEnrichmentProgress).await;

        assert_eq!(stats.matched, 0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&"2330".into()).unwrap().related_concepts, None);
    }
}
