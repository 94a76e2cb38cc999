use std::time::Duration;

use assert_matches::assert_matches;

use gene_harvester::config::{Config, ConfigLoader, apply_env_overrides};
use gene_harvester::domain::IdentifierPolicy;
use gene_harvester::error::HarvestError;
use gene_harvester::retry::ClientErrorPolicy;

#[test]
fn parse_partial_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("gene-harvest.json");
    std::fs::write(
        &path,
        r#"{
            "identifiers": { "path": "genes.csv", "normalization": "preserve" },
            "interactions": { "access_key": "from-file", "retry": { "client_errors": "fail-fast" } },
            "metadata": { "batch_size": 25, "min_interval_ms": 250 },
            "pages": {
                "concurrency": 8,
                "render": {
                    "chrome_executable": "/usr/bin/chromium",
                    "headless": false,
                    "args": ["--no-sandbox"],
                    "viewport": { "width": 1280, "height": 720 },
                    "wait_timeout_secs": 20
                }
            }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.identifiers.path.as_str(), "genes.csv");
    assert_eq!(resolved.identifiers.column, "gene_name");
    assert_eq!(resolved.identifiers.policy, IdentifierPolicy::Preserve);
    assert_eq!(
        resolved.interactions.retry.client_errors,
        ClientErrorPolicy::FailFast
    );
    assert_eq!(resolved.metadata.batch_size, 25);
    assert_eq!(resolved.metadata.min_interval, Duration::from_millis(250));
    assert_eq!(resolved.pages.concurrency, 8);
    assert_eq!(
        resolved.pages.render.launch.executable.as_deref(),
        Some(std::path::Path::new("/usr/bin/chromium"))
    );
    assert_eq!(resolved.pages.render.launch.args, vec!["--no-sandbox".to_string()]);
    assert!(!resolved.pages.render.launch.headless);
    assert_eq!(resolved.pages.render.launch.viewport.width, 1280);
    assert_eq!(resolved.pages.render.wait_timeout, Duration::from_secs(20));
    assert_eq!(resolved.pages.json_dir.as_str(), "data/wikicrow/json");
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(HarvestError::ConfigRead(_))
    );
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{ \"metadata\": ").unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(HarvestError::ConfigParse(_))
    );
}

#[test]
fn zero_bounds_are_rejected() {
    let config: Config = serde_json::from_str(r#"{ "pages": { "concurrency": 0 } }"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(message)) if message.contains("pages.concurrency")
    );

    let config: Config =
        serde_json::from_str(r#"{ "metadata": { "retry": { "max_attempts": 0 } } }"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(_))
    );

    let config: Config = serde_json::from_str(r#"{ "metadata": { "batch_size": 0 } }"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(_))
    );
}

#[test]
fn access_key_is_required_for_interactions() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    assert_matches!(
        resolved.interactions.require_access_key(),
        Err(HarvestError::MissingAccessKey("BIOGRID_API_KEY"))
    );
}

#[test]
fn environment_overrides_file_values() {
    let config: Config = serde_json::from_str(
        r#"{ "interactions": { "access_key": "from-file" },
             "pages": { "render": { "chrome_executable": "/opt/chrome/chrome" } } }"#,
    )
    .unwrap();
    let mut resolved = ConfigLoader::resolve_config(config).unwrap();
    apply_env_overrides(&mut resolved, |key| match key {
        "BIOGRID_API_KEY" => Some("from-env".to_string()),
        "GENE_HARVEST_CHROME" => Some("/usr/bin/chromium".to_string()),
        _ => None,
    });
    assert_eq!(resolved.interactions.require_access_key().unwrap(), "from-env");
    assert_eq!(
        resolved.pages.render.launch.executable.as_deref(),
        Some(std::path::Path::new("/usr/bin/chromium"))
    );
}
