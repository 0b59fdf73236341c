//! Data-source adapters for companyinfo.
//!
//! This crate provides:
//! - [`registry`], [`etf`], [`index_weight`]: tabular sources behind [`TabularSources`]
//! - [`detail`], [`groups`]: detail pages and the group index behind [`DetailSource`]
//! - [`session`]: the [`BrowserSession`] those pages are loaded through
//! - [`classifier`]: the [`TextClassifier`] used for concept classification
//!
//! Adapters do no retrying and no merging. Failures carry a
//! [`FailureKind`](companyinfo_shared::FailureKind) for the caller's retry policy.

pub mod classifier;
pub mod detail;
pub mod etf;
pub mod groups;
pub mod http;
pub mod index_weight;
pub mod registry;
pub mod session;
pub mod tables;
pub mod tabular;

pub use classifier::{GeminiClassifier, TextClassifier};
pub use detail::{DetailSource, WebDetailSource, parse_detail};
pub use session::{BrowserSession, HttpSession};
pub use tabular::{HttpSources, TabularSources};
