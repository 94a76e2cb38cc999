use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{FetchResult, Identifier, SourceKind, ValidationOutcome};
use crate::extract::Extractor;
use crate::fetcher::{Fetcher, Transport};
use crate::orchestrator::Harvest;
use crate::store::{CacheStore, Persister};
use crate::validate::Validator;

/// Non-terminal states an identifier passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    CacheCheck,
    Fetching,
    Validating,
    Extracting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::CacheCheck => "cache-check",
            Stage::Fetching => "fetching",
            Stage::Validating => "validating",
            Stage::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

/// Where an identifier's pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Terminal {
    Cached,
    Persisted {
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    FetchFailed {
        reason: String,
    },
    Invalid {
        reason: String,
    },
    PersistFailed {
        reason: String,
    },
}

impl Terminal {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Terminal::FetchFailed { .. } | Terminal::Invalid { .. } | Terminal::PersistFailed { .. }
        )
    }
}

/// Cache check, fetch, validate, extract and persist for one identifier at
/// a time. Holds no per-identifier state between calls.
pub struct Pipeline<T: Transport> {
    source: SourceKind,
    fetcher: Fetcher<T>,
    validator: Arc<dyn Validator>,
    extractor: Arc<dyn Extractor>,
    cache: Arc<dyn CacheStore>,
    persister: Arc<dyn Persister>,
}

impl<T: Transport> Pipeline<T> {
    pub fn new<S>(
        source: SourceKind,
        fetcher: Fetcher<T>,
        validator: impl Validator + 'static,
        extractor: impl Extractor + 'static,
        store: Arc<S>,
    ) -> Self
    where
        S: CacheStore + Persister + 'static,
    {
        Self {
            source,
            fetcher,
            validator: Arc::new(validator),
            extractor: Arc::new(extractor),
            cache: store.clone(),
            persister: store,
        }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub async fn run(&self, identifier: &Identifier) -> Terminal {
        self.enter(identifier, Stage::Pending);
        self.enter(identifier, Stage::CacheCheck);
        if self.cache.has_complete_artifact(identifier).await {
            info!(source = %self.source, identifier = %identifier, "cache hit, skipping");
            return Terminal::Cached;
        }

        if let Some(snapshot) = self.cache.load_snapshot(identifier).await {
            self.enter(identifier, Stage::Validating);
            let outcome = self.validator.validate(&snapshot);
            if outcome.is_usable() {
                info!(source = %self.source, identifier = %identifier, "reusing saved snapshot");
                return self.extract_and_persist(identifier, &snapshot, outcome).await;
            }
            info!(
                source = %self.source,
                identifier = %identifier,
                reason = outcome.reason().unwrap_or_default(),
                "saved snapshot is stale, refetching"
            );
        } else {
            debug!(source = %self.source, identifier = %identifier, "cache miss");
        }

        self.enter(identifier, Stage::Fetching);
        let FetchResult {
            raw_content,
            succeeded,
            failure_reason,
            ..
        } = self.fetcher.fetch(identifier).await;
        let content = match raw_content {
            Some(content) if succeeded => content,
            _ => {
                let reason = failure_reason.unwrap_or_else(|| "no content returned".to_string());
                warn!(source = %self.source, identifier = %identifier, reason = %reason, "fetch failed, no artifact written");
                return Terminal::FetchFailed { reason };
            }
        };

        if let Err(err) = self.persister.save_raw(identifier, &content).await {
            warn!(source = %self.source, identifier = %identifier, error = %err, "snapshot not saved");
        }

        self.enter(identifier, Stage::Validating);
        let outcome = self.validator.validate(&content);
        if let ValidationOutcome::Invalid(reason) = outcome {
            warn!(source = %self.source, identifier = %identifier, reason = %reason, "content rejected, no artifact written");
            return Terminal::Invalid { reason };
        }
        self.extract_and_persist(identifier, &content, outcome).await
    }

    async fn extract_and_persist(
        &self,
        identifier: &Identifier,
        content: &[u8],
        outcome: ValidationOutcome,
    ) -> Terminal {
        self.enter(identifier, Stage::Extracting);
        let text = String::from_utf8_lossy(content);
        let mut artifact = self.extractor.extract(&text, identifier);
        let warning = match outcome {
            ValidationOutcome::Warning(reason) => {
                artifact.note(&reason);
                info!(source = %self.source, identifier = %identifier, reason = %reason, "content declares insufficient data");
                Some(reason)
            }
            _ => None,
        };
        if let Some(error) = artifact.error() {
            debug!(source = %self.source, identifier = %identifier, error, "record carries an error");
        }

        match self.persister.save(&artifact).await {
            Ok(location) => {
                info!(source = %self.source, identifier = %identifier, path = %location, "persisted");
                Terminal::Persisted { warning }
            }
            Err(err) => {
                warn!(source = %self.source, identifier = %identifier, error = %err, "persist failed");
                Terminal::PersistFailed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn enter(&self, identifier: &Identifier, stage: Stage) {
        debug!(source = %self.source, identifier = %identifier, stage = %stage, "stage");
    }
}

#[async_trait]
impl<T: Transport + 'static> Harvest for Pipeline<T> {
    fn source(&self) -> SourceKind {
        self.source
    }

    async fn harvest(&self, identifiers: Vec<Identifier>) -> Vec<(Identifier, Terminal)> {
        let mut outcomes = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let terminal = self.run(&identifier).await;
            outcomes.push((identifier, terminal));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::extract::PageExtractor;
    use crate::retry::{ClientErrorPolicy, RetryPolicy, TransportError};
    use crate::store::FsStore;
    use crate::validate::PageValidator;

    const PAGE: &str = "<div><div><h2>Info</h2></div><ul>\
        <li><p>gene names: tumor protein p53</p></li>\
        <li><p>gene alias: P53</p></li>\
        <li><p>type: protein-coding</p></li></ul></div>";

    struct ScriptedTransport {
        body: Option<&'static str>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_once(&self, _identifier: &Identifier) -> Result<Vec<u8>, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.body
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| TransportError::Connect("refused".to_string()))
        }
    }

    fn pipeline(
        body: Option<&'static str>,
        root: &Utf8PathBuf,
    ) -> (Pipeline<Arc<ScriptedTransport>>, Arc<ScriptedTransport>, Arc<FsStore>) {
        let transport = Arc::new(ScriptedTransport {
            body,
            calls: Mutex::new(0),
        });
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_cap: Duration::from_secs(1),
            client_errors: ClientErrorPolicy::Retry,
        };
        let store = Arc::new(FsStore::new(root.join("json"), ".json").with_snapshots(root.join("html")));
        let pipeline = Pipeline::new(
            SourceKind::Pages,
            Fetcher::new(transport.clone(), policy),
            PageValidator,
            PageExtractor,
            store.clone(),
        );
        (pipeline, transport, store)
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[tokio::test]
    async fn fetch_saves_snapshot_and_record() {
        let (_temp, root) = scratch();
        let (pipeline, transport, store) = pipeline(Some(PAGE), &root);
        let id: Identifier = "TP53".parse().unwrap();

        assert_eq!(pipeline.run(&id).await, Terminal::Persisted { warning: None });
        assert_eq!(*transport.calls.lock().unwrap(), 1);
        assert!(store.snapshot_path(&id).unwrap().exists());
        assert!(store.artifact_path(&id).exists());

        assert_eq!(pipeline.run(&id).await, Terminal::Cached);
        assert_eq!(*transport.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn valid_snapshot_skips_fetch() {
        let (_temp, root) = scratch();
        let (pipeline, transport, store) = pipeline(None, &root);
        let id: Identifier = "TP53".parse().unwrap();
        store.save_raw(&id, PAGE.as_bytes()).await.unwrap();

        assert_eq!(pipeline.run(&id).await, Terminal::Persisted { warning: None });
        assert_eq!(*transport.calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_triggers_refetch() {
        let (_temp, root) = scratch();
        let (pipeline, transport, store) = pipeline(None, &root);
        let id: Identifier = "TP53".parse().unwrap();
        store.save_raw(&id, b"<html><body>Loading</body></html>").await.unwrap();

        assert_matches!(pipeline.run(&id).await, Terminal::FetchFailed { .. });
        assert_eq!(*transport.calls.lock().unwrap(), 2);
        assert!(!store.artifact_path(&id).exists());
    }

    #[tokio::test]
    async fn invalid_content_is_not_persisted() {
        let (_temp, root) = scratch();
        let (pipeline, _transport, store) = pipeline(Some("<p>nothing here</p>"), &root);
        let id: Identifier = "TP53".parse().unwrap();

        assert_eq!(
            pipeline.run(&id).await,
            Terminal::Invalid {
                reason: "missing expected structure".to_string()
            }
        );
        assert!(!store.artifact_path(&id).exists());
    }

    #[test]
    fn terminal_serializes_with_state_tag() {
        let value = serde_json::to_value(Terminal::FetchFailed {
            reason: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(value["state"], "fetch_failed");
        assert_eq!(value["reason"], "boom");
        assert!(Terminal::Invalid { reason: String::new() }.is_failure());
        assert!(!Terminal::Cached.is_failure());
    }
}
