//! Application configuration for companyinfo.
//!
//! User config lives at `~/.companyinfo/companyinfo.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CompanyInfoError, Result};
use crate::types::ConceptCategory;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "companyinfo.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".companyinfo";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Config structs (matching companyinfo.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Official registry tables.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Priority chains for contested fields.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// ETF constituent and index weight sources.
    #[serde(default)]
    pub weights: WeightsConfig,

    /// Per-security detail pages and the group index.
    #[serde(default)]
    pub detail: DetailConfig,

    /// LLM concept classification.
    #[serde(default)]
    pub classification: ClassificationConfig,

    /// Ordered concept catalog; one flag column per entry.
    #[serde(default = "default_concept_catalog")]
    pub concepts: Vec<ConceptCategory>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            http: HttpConfig::default(),
            registry: RegistryConfig::default(),
            reconcile: ReconcileConfig::default(),
            weights: WeightsConfig::default(),
            detail: DetailConfig::default(),
            classification: ClassificationConfig::default(),
            concepts: default_concept_catalog(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base identifier list.
    #[serde(default = "default_input")]
    pub input: String,

    /// Unified output table.
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// Prefix the output with a UTF-8 byte order mark.
    #[serde(default = "default_true")]
    pub write_bom: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            id_column: default_id_column(),
            name_column: default_name_column(),
            write_bom: true,
        }
    }
}

fn default_input() -> String {
    "StockID_TWSE_TPEX.csv".into()
}
fn default_output() -> String {
    "raw_companyinfo.csv".into()
}
fn default_id_column() -> String {
    "代號".into()
}
fn default_name_column() -> String {
    "名稱".into()
}
fn default_true() -> bool {
    true
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout for tabular sources, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip TLS certificate verification (the registry host serves an incomplete chain).
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: true,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_user_agent() -> String {
    BROWSER_USER_AGENT.into()
}
fn default_timeout_secs() -> u64 {
    20
}

/// `[registry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// URL template; `{mode}` is replaced by each source's mode.
    #[serde(default = "default_registry_url")]
    pub url_template: String,

    /// Registry tables to fetch, in fetch order.
    #[serde(default = "default_registry_sources")]
    pub sources: Vec<RegistrySourceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url_template: default_registry_url(),
            sources: default_registry_sources(),
        }
    }
}

impl RegistryConfig {
    pub fn url_for(&self, source: &RegistrySourceConfig) -> String {
        self.url_template.replace("{mode}", &source.mode.to_string())
    }
}

/// `[[registry.sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySourceConfig {
    /// Source name referenced by the priority chains.
    pub name: String,
    /// Market-mode query parameter.
    pub mode: u32,
    /// Fixed market value overriding the table's own column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_label: Option<String>,
}

fn default_registry_url() -> String {
    "https://isin.twse.com.tw/isin/C_public.jsp?strMode={mode}".into()
}
fn default_registry_sources() -> Vec<RegistrySourceConfig> {
    let source = |name: &str, mode: u32, label: Option<&str>| RegistrySourceConfig {
        name: name.into(),
        mode,
        market_label: label.map(Into::into),
    };
    vec![
        source("TWSE", 2, None),
        source("TPEX", 4, None),
        source("Emerging", 5, None),
        source("Public", 1, Some("公開發行")),
    ]
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Source names consulted for `市場別`, first non-empty wins.
    #[serde(default = "default_chain")]
    pub market_class: Vec<String>,

    /// Source names consulted for `產業別`, first non-empty wins.
    #[serde(default = "default_chain")]
    pub industry_class: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            market_class: default_chain(),
            industry_class: default_chain(),
        }
    }
}

fn default_chain() -> Vec<String> {
    ["TWSE", "TPEX", "Emerging", "Public"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[weights]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsConfig {
    /// ETF fund ids; one `ETF_<id>_權重` column each, in this order.
    #[serde(default = "default_etf_funds")]
    pub etf_funds: Vec<String>,

    /// `{fund_id}` is replaced by the fund id.
    #[serde(default = "default_etf_url")]
    pub etf_url_template: String,

    /// Market-cap share of the broad index.
    #[serde(default = "default_index_url")]
    pub index_url: String,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            etf_funds: default_etf_funds(),
            etf_url_template: default_etf_url(),
            index_url: default_index_url(),
        }
    }
}

impl WeightsConfig {
    pub fn etf_url(&self, fund_id: &str) -> String {
        self.etf_url_template.replace("{fund_id}", fund_id)
    }
}

fn default_etf_funds() -> Vec<String> {
    ["0050", "0056", "00878", "00919"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_etf_url() -> String {
    "https://www.moneydj.com/ETF/X/Basic/Basic0007B.xdjhtm?etfid={fund_id}.TW".into()
}
fn default_index_url() -> String {
    "https://www.taifex.com.tw/cht/9/futuresQADetail".into()
}

/// `[detail]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `{id}` is replaced by the security identifier.
    #[serde(default = "default_detail_url")]
    pub url_template: String,

    #[serde(default = "default_group_list_url")]
    pub group_list_url: String,

    /// Page load timeout, in seconds.
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,

    /// Attempts per identifier, including the first.
    #[serde(default = "default_detail_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step, in milliseconds.
    #[serde(default = "default_retry_step_ms")]
    pub retry_step_ms: u64,

    /// Pause between identifiers, in milliseconds.
    #[serde(default = "default_polite_delay_ms")]
    pub polite_delay_ms: u64,

    /// Pause after each group page, in milliseconds.
    #[serde(default = "default_group_delay_ms")]
    pub group_delay_ms: u64,

    /// Consecutive fully-failed identifiers that stop the pass.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_template: default_detail_url(),
            group_list_url: default_group_list_url(),
            page_timeout_secs: default_page_timeout_secs(),
            max_attempts: default_detail_attempts(),
            retry_step_ms: default_retry_step_ms(),
            polite_delay_ms: default_polite_delay_ms(),
            group_delay_ms: default_group_delay_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl DetailConfig {
    pub fn detail_url(&self, id: &str) -> String {
        self.url_template.replace("{id}", id)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn retry_step(&self) -> Duration {
        Duration::from_millis(self.retry_step_ms)
    }

    pub fn polite_delay(&self) -> Duration {
        Duration::from_millis(self.polite_delay_ms)
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }
}

fn default_detail_url() -> String {
    "https://goodinfo.tw/tw/StockDetail.asp?STOCK_ID={id}".into()
}
fn default_group_list_url() -> String {
    "https://goodinfo.tw/tw/StockList.asp?MARKET_CAT=%E9%9B%86%E5%9C%98%E8%82%A1&SHEET=%E8%82%A1%E7%A5%A8%E6%B8%85%E5%96%AE".into()
}
fn default_page_timeout_secs() -> u64 {
    60
}
fn default_detail_attempts() -> u32 {
    2
}
fn default_retry_step_ms() -> u64 {
    5_000
}
fn default_polite_delay_ms() -> u64 {
    3_000
}
fn default_group_delay_ms() -> u64 {
    1_500
}
fn default_failure_threshold() -> u32 {
    5
}

/// `[classification]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API base; the model path and `:generateContent` are appended.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Identifiers per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_classification_attempts")]
    pub max_attempts: u32,

    /// Exponential backoff base, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Pause after each successful batch, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Companies the classifier is asked to match against.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_api_key_env(),
            model: default_model(),
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            max_attempts: default_classification_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            targets: default_targets(),
        }
    }
}

impl ClassificationConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_batch_size() -> usize {
    40
}
fn default_classification_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    3_000
}
fn default_batch_delay_ms() -> u64 {
    3_000
}
fn default_targets() -> Vec<String> {
    [
        "Nvidia", "Oracle", "Google", "Amazon", "Meta", "OpenAI", "Microsoft", "AMD", "Apple",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// The built-in concept catalog, in output column order.
pub fn default_concept_catalog() -> Vec<ConceptCategory> {
    let entry = |name: &str, keywords: &[&str]| ConceptCategory {
        name: name.into(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    };
    vec![
        entry("nVidia概念", &["nvidia", "輝達"]),
        entry("Google概念", &["google", "谷歌"]),
        entry("Amazon概念", &["amazon", "亞馬遜"]),
        entry("Meta概念", &["meta", "facebook", "臉書"]),
        entry("OpenAI概念", &["openai", "open ai", "chatgpt"]),
        entry("Microsoft概念", &["microsoft", "msft", "微軟"]),
        entry("AMD概念", &["amd", "超微"]),
        entry("Apple概念", &["apple", "蘋果"]),
        entry("Oracle概念", &["oracle", "甲骨文"]),
        entry("Micro概念", &["supermicro", "美超微", "super micro"]),
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.companyinfo/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CompanyInfoError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.companyinfo/companyinfo.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CompanyInfoError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CompanyInfoError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CompanyInfoError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CompanyInfoError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CompanyInfoError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the classification API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.classification.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(CompanyInfoError::config(format!(
            "classification API key not found. Set the {var_name} environment variable \
             or pass --no-classify."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("StockID_TWSE_TPEX.csv"));
        assert!(toml_str.contains("GOOGLE_API_KEY"));
        assert!(toml_str.contains("公開發行"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.classification.batch_size, 40);
        assert_eq!(parsed.registry.sources, config.registry.sources);
        assert_eq!(parsed.concepts, config.concepts);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[paths]
output = "/tmp/out.csv"

[detail]
enabled = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.paths.output, "/tmp/out.csv");
        assert_eq!(config.paths.input, "StockID_TWSE_TPEX.csv");
        assert!(!config.detail.enabled);
        assert_eq!(config.detail.failure_threshold, 5);
        assert_eq!(config.concepts.len(), 10);
    }

    #[test]
    fn custom_concept_catalog_replaces_default() {
        let toml_str = r#"
[[concepts]]
name = "Tesla概念"
keywords = ["tesla", "特斯拉"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.concepts.len(), 1);
        assert_eq!(config.concepts[0].name, "Tesla概念");
    }

    #[test]
    fn url_templates_expand() {
        let config = AppConfig::default();
        let public = &config.registry.sources[3];
        assert!(config.registry.url_for(public).ends_with("strMode=1"));
        assert!(config.weights.etf_url("0056").contains("etfid=0056.TW"));
        assert!(config.detail.detail_url("2330").ends_with("STOCK_ID=2330"));
    }

    #[test]
    fn default_durations() {
        let config = AppConfig::default();
        assert_eq!(config.detail.retry_step(), Duration::from_secs(5));
        assert_eq!(config.detail.polite_delay(), Duration::from_secs(3));
        assert_eq!(config.detail.group_delay(), Duration::from_millis(1500));
        assert_eq!(config.classification.backoff_base(), Duration::from_secs(3));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.classification.api_key_env = "CI_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("CI_TEST_NONEXISTENT_KEY_12345")
        );
    }
}
