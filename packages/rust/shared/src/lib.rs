//! Shared types, error model, and configuration for companyinfo.
//!
//! This crate is the foundation depended on by all other companyinfo crates.
//! It provides:
//! - [`CompanyInfoError`]: the unified error type, with [`FailureKind`] classification
//! - Domain types ([`SecurityId`], [`SourceTable`], [`PartialRecord`], [`DetailFields`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - Tag-list helpers shared by the source adapters and the reconciliation engine

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassificationConfig, DetailConfig, HttpConfig, PathsConfig, ReconcileConfig,
    RegistryConfig, RegistrySourceConfig, WeightsConfig, config_dir, config_file_path,
    default_concept_catalog, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{CompanyInfoError, FailureKind, Result};
pub use types::{
    ChainedField, ConceptCategory, DetailFields, GroupMap, PartialRecord, SecurityId,
    SourceTable, WeightMap,
};
