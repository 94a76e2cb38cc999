use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::IdentifierPolicy;
use crate::error::HarvestError;
use crate::render::{LaunchOptions, Viewport};
use crate::retry::{ClientErrorPolicy, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "gene-harvest.json";
pub const ACCESS_KEY_ENV: &str = "BIOGRID_API_KEY";
pub const CHROME_PATH_ENV: &str = "GENE_HARVEST_CHROME";

/// On-disk configuration. Every field is optional; `ConfigLoader` fills the
/// gaps with defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub identifiers: IdentifiersConfig,
    #[serde(default)]
    pub interactions: InteractionsConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub pages: PagesConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IdentifiersConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub normalization: Option<IdentifierPolicy>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_cap_secs: Option<u64>,
    #[serde(default)]
    pub client_errors: Option<ClientErrorPolicy>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct InteractionsConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PagesConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub html_dir: Option<String>,
    #[serde(default)]
    pub json_dir: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub chrome_executable: Option<String>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub marker_selector: Option<String>,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct IdentifierSettings {
    pub path: Utf8PathBuf,
    pub column: String,
    pub policy: IdentifierPolicy,
}

#[derive(Debug, Clone)]
pub struct InteractionSettings {
    pub base_url: String,
    pub output_dir: Utf8PathBuf,
    pub access_key: Option<String>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl InteractionSettings {
    pub fn require_access_key(&self) -> Result<&str, HarvestError> {
        self.access_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(HarvestError::MissingAccessKey(ACCESS_KEY_ENV))
    }
}

#[derive(Debug, Clone)]
pub struct MetadataSettings {
    pub base_url: String,
    pub output_dir: Utf8PathBuf,
    pub batch_size: usize,
    pub min_interval: Duration,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub launch: LaunchOptions,
    pub marker_selector: String,
    pub wait_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub base_url: String,
    pub html_dir: Utf8PathBuf,
    pub json_dir: Utf8PathBuf,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub http_timeout: Duration,
    pub identifiers: IdentifierSettings,
    pub interactions: InteractionSettings,
    pub metadata: MetadataSettings,
    pub pages: PageSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file (an explicit path must exist; the default file
    /// may be absent) and applies environment overrides.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| HarvestError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config)?;
        apply_env_overrides(&mut resolved, |key| std::env::var(key).ok());
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let http_timeout = Duration::from_secs(config.http_timeout_secs.unwrap_or(60));

        let identifiers = IdentifierSettings {
            path: config
                .identifiers
                .path
                .unwrap_or_else(|| "data/gene_df.csv".to_string())
                .into(),
            column: config
                .identifiers
                .column
                .unwrap_or_else(|| "gene_name".to_string()),
            policy: config.identifiers.normalization.unwrap_or_default(),
        };

        let interactions = InteractionSettings {
            base_url: config
                .interactions
                .base_url
                .unwrap_or_else(|| "https://webservice.thebiogrid.org/interactions/".to_string()),
            output_dir: config
                .interactions
                .output_dir
                .unwrap_or_else(|| "data/csv".to_string())
                .into(),
            access_key: config.interactions.access_key,
            concurrency: at_least_one("interactions.concurrency", config.interactions.concurrency, 1)?,
            retry: resolve_retry("interactions", config.interactions.retry, 3, ClientErrorPolicy::Retry)?,
        };

        let metadata = MetadataSettings {
            base_url: config
                .metadata
                .base_url
                .unwrap_or_else(|| "https://mygene.info/v3/query".to_string()),
            output_dir: config
                .metadata
                .output_dir
                .unwrap_or_else(|| "data/mygene_info".to_string())
                .into(),
            batch_size: at_least_one("metadata.batch_size", config.metadata.batch_size, 10)?,
            min_interval: Duration::from_millis(config.metadata.min_interval_ms.unwrap_or(1000)),
            concurrency: at_least_one("metadata.concurrency", config.metadata.concurrency, 1)?,
            retry: resolve_retry("metadata", config.metadata.retry, 5, ClientErrorPolicy::FailFast)?,
        };

        let render = config.pages.render;
        let viewport = render.viewport.unwrap_or_default();
        if viewport.width == 0 || viewport.height == 0 {
            return Err(HarvestError::InvalidConfig(
                "pages.render.viewport must be non-zero".to_string(),
            ));
        }
        let pages = PageSettings {
            base_url: config
                .pages
                .base_url
                .unwrap_or_else(|| "https://wikicrow.ai/".to_string()),
            html_dir: config
                .pages
                .html_dir
                .unwrap_or_else(|| "data/wikicrow/html".to_string())
                .into(),
            json_dir: config
                .pages
                .json_dir
                .unwrap_or_else(|| "data/wikicrow/json".to_string())
                .into(),
            concurrency: at_least_one("pages.concurrency", config.pages.concurrency, 10)?,
            retry: resolve_retry("pages", config.pages.retry, 1, ClientErrorPolicy::Retry)?,
            render: RenderSettings {
                launch: LaunchOptions {
                    executable: render.chrome_executable.map(PathBuf::from),
                    headless: render.headless.unwrap_or(true),
                    viewport,
                    args: render.args.unwrap_or_default(),
                },
                marker_selector: render
                    .marker_selector
                    .unwrap_or_else(|| "div#References".to_string()),
                wait_timeout: Duration::from_secs(render.wait_timeout_secs.unwrap_or(10)),
            },
        };

        Ok(ResolvedConfig {
            schema_version,
            http_timeout,
            identifiers,
            interactions,
            metadata,
            pages,
        })
    }
}

/// Environment wins over the file for the access key and the browser
/// binary. Blank values are ignored.
pub fn apply_env_overrides(resolved: &mut ResolvedConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_blank = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    if let Some(key) = non_blank(ACCESS_KEY_ENV) {
        resolved.interactions.access_key = Some(key);
    }
    if let Some(path) = non_blank(CHROME_PATH_ENV) {
        resolved.pages.render.launch.executable = Some(PathBuf::from(path));
    }
}

fn at_least_one(field: &str, value: Option<usize>, default: usize) -> Result<usize, HarvestError> {
    match value {
        Some(0) => Err(HarvestError::InvalidConfig(format!("{field} must be at least 1"))),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn resolve_retry(
    section: &str,
    retry: RetryConfig,
    default_attempts: u32,
    default_client_errors: ClientErrorPolicy,
) -> Result<RetryPolicy, HarvestError> {
    let max_attempts = retry.max_attempts.unwrap_or(default_attempts);
    if max_attempts == 0 {
        return Err(HarvestError::InvalidConfig(format!(
            "{section}.retry.max_attempts must be at least 1"
        )));
    }
    Ok(RetryPolicy {
        max_attempts,
        backoff_cap: Duration::from_secs(retry.backoff_cap_secs.unwrap_or(10)),
        client_errors: retry.client_errors.unwrap_or(default_client_errors),
    })
}
