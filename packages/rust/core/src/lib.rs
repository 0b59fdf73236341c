//! Reconciliation and enrichment pipeline for companyinfo.
//!
//! This crate merges the tabular sources onto the base table, runs the
//! detail-page and classification passes under the retry policy and circuit
//! breaker, tags concept flags and writes the unified table (`run_pipeline`).

pub mod classification;
pub mod concepts;
pub mod enrichment;
pub mod pipeline;
pub mod reconcile;
pub mod records;
pub mod resilience;
pub mod table;

pub use concepts::{ConceptFlags, ConceptTagger};
pub use pipeline::{PipelineResult, ProgressReporter, SilentProgress, run_pipeline};
pub use records::{ColumnLayout, RecordPatch, RecordSet, SecurityRecord};
