//! The tabular sources as one collaborator.
//!
//! Every method degrades to an empty result on failure and logs why, so the
//! reconciliation engine always receives a well-formed table.

use reqwest::Client;
use tracing::warn;

use companyinfo_shared::{AppConfig, RegistrySourceConfig, Result, SourceTable, WeightMap};

use crate::etf::fetch_etf_weights;
use crate::http::build_client;
use crate::index_weight::fetch_index_weights;
use crate::registry::fetch_registry;

/// Registry tables, ETF constituents and index weights.
#[allow(async_fn_in_trait)]
pub trait TabularSources {
    async fn registry(&self, source: &RegistrySourceConfig) -> SourceTable;
    async fn etf_weights(&self, fund_id: &str) -> WeightMap;
    async fn index_weights(&self) -> WeightMap;
}

/// [`TabularSources`] over plain HTTP.
pub struct HttpSources {
    client: Client,
    config: AppConfig,
}

impl HttpSources {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.http)?,
            config: config.clone(),
        })
    }
}

impl TabularSources for HttpSources {
    async fn registry(&self, source: &RegistrySourceConfig) -> SourceTable {
        match fetch_registry(&self.client, &self.config.registry, source).await {
            Ok(table) => table,
            Err(e) => {
                warn!(source = %source.name, error = %e, "registry source unavailable");
                SourceTable::new(&source.name)
            }
        }
    }

    async fn etf_weights(&self, fund_id: &str) -> WeightMap {
        fetch_etf_weights(&self.client, &self.config.weights, fund_id)
            .await
            .unwrap_or_else(|e| {
                warn!(fund = %fund_id, error = %e, "ETF weights unavailable");
                WeightMap::new()
            })
    }

    async fn index_weights(&self) -> WeightMap {
        fetch_index_weights(&self.client, &self.config.weights)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "index weights unavailable");
                WeightMap::new()
            })
    }
}
