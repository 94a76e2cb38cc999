use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{Artifact, ExtractedRecord, Identifier, SourceKind, ValidationOutcome};
use crate::http::check_status;
use crate::limiter::RateGate;
use crate::orchestrator::Harvest;
use crate::pipeline::Terminal;
use crate::retry::{RetryError, RetryPolicy, TransportError};
use crate::store::{CacheStore, Persister};
use crate::validate::MISSING_STRUCTURE;

pub const NOT_FOUND: &str = "not found";

/// Batch symbol lookup against the gene metadata service.
#[async_trait]
pub trait MyGeneClient: Send + Sync {
    /// One request for the whole batch. Returns the raw hit objects.
    async fn query_many(&self, identifiers: &[Identifier]) -> Result<Vec<Value>, TransportError>;
}

#[async_trait]
impl<T: MyGeneClient + ?Sized> MyGeneClient for Arc<T> {
    async fn query_many(&self, identifiers: &[Identifier]) -> Result<Vec<Value>, TransportError> {
        (**self).query_many(identifiers).await
    }
}

#[derive(Clone)]
pub struct MyGeneHttpClient {
    client: Client,
    base_url: String,
}

impl MyGeneHttpClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MyGeneClient for MyGeneHttpClient {
    async fn query_many(&self, identifiers: &[Identifier]) -> Result<Vec<Value>, TransportError> {
        let query = identifiers
            .iter()
            .map(Identifier::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .client
            .post(&self.base_url)
            .form(&[
                ("q", query.as_str()),
                ("scopes", "symbol"),
                ("fields", "all"),
            ])
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        let response = check_status(response).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))
    }
}

pub fn classify_hit(hit: &Value) -> ValidationOutcome {
    match hit {
        Value::Object(fields) if fields.get("notfound").and_then(Value::as_bool) == Some(true) => {
            ValidationOutcome::Invalid(NOT_FOUND.to_string())
        }
        Value::Object(_) => ValidationOutcome::Valid,
        _ => ValidationOutcome::Invalid(MISSING_STRUCTURE.to_string()),
    }
}

/// Groups hits by the `query` they answer. The first hit per query wins.
pub fn split_hits(hits: Vec<Value>) -> HashMap<String, Value> {
    let mut by_query = HashMap::new();
    for hit in hits {
        let Some(query) = hit.get("query").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        by_query.entry(query).or_insert(hit);
    }
    by_query
}

/// Harvests metadata in batches: one rate-gated request per batch, then one
/// JSON artifact per returned hit.
pub struct MetadataHarvester<C: MyGeneClient> {
    client: C,
    policy: RetryPolicy,
    rate_gate: Arc<RateGate>,
    batch_size: usize,
    cache: Arc<dyn CacheStore>,
    persister: Arc<dyn Persister>,
}

impl<C: MyGeneClient> MetadataHarvester<C> {
    pub fn new<S>(
        client: C,
        policy: RetryPolicy,
        rate_gate: Arc<RateGate>,
        batch_size: usize,
        store: Arc<S>,
    ) -> Self
    where
        S: CacheStore + Persister + 'static,
    {
        Self {
            client,
            policy,
            rate_gate,
            batch_size: batch_size.max(1),
            cache: store.clone(),
            persister: store,
        }
    }

    async fn query(&self, batch: &[Identifier]) -> Result<Vec<Value>, String> {
        let client = &self.client;
        let gate = self.rate_gate.as_ref();
        let label = batch.first().map(Identifier::as_str).unwrap_or("batch");
        let result = self
            .policy
            .run(label, |_| async move {
                gate.wait().await;
                client.query_many(batch).await
            })
            .await;
        result.map(|(hits, _)| hits).map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => {
                format!("retries exhausted after {attempts} attempt(s): {last}")
            }
            RetryError::NonRetryable { error, .. } => format!("non-retryable: {error}"),
        })
    }

    async fn persist_hit(&self, identifier: &Identifier, hit: Value) -> Terminal {
        if let ValidationOutcome::Invalid(reason) = classify_hit(&hit) {
            info!(identifier = %identifier, reason = %reason, "no metadata for identifier");
            return Terminal::Invalid { reason };
        }
        let Value::Object(fields) = hit else {
            return Terminal::Invalid {
                reason: MISSING_STRUCTURE.to_string(),
            };
        };
        let artifact = Artifact::Record(ExtractedRecord::from_fields(identifier.clone(), fields));
        match self.persister.save(&artifact).await {
            Ok(location) => {
                info!(identifier = %identifier, path = %location, "persisted");
                Terminal::Persisted { warning: None }
            }
            Err(err) => {
                warn!(identifier = %identifier, error = %err, "persist failed");
                Terminal::PersistFailed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl<C: MyGeneClient + 'static> Harvest for MetadataHarvester<C> {
    fn source(&self) -> SourceKind {
        SourceKind::Metadata
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn harvest(&self, identifiers: Vec<Identifier>) -> Vec<(Identifier, Terminal)> {
        let mut outcomes = Vec::with_capacity(identifiers.len());
        let mut pending = Vec::new();
        for identifier in identifiers {
            if self.cache.has_complete_artifact(&identifier).await {
                info!(source = %SourceKind::Metadata, identifier = %identifier, "cache hit, skipping");
                outcomes.push((identifier, Terminal::Cached));
            } else {
                pending.push(identifier);
            }
        }
        if pending.is_empty() {
            return outcomes;
        }

        info!(count = pending.len(), first = %pending[0], "querying metadata batch");
        let hits = match self.query(&pending).await {
            Ok(hits) => hits,
            Err(reason) => {
                warn!(count = pending.len(), reason = %reason, "metadata batch failed, no artifacts written");
                outcomes.extend(pending.into_iter().map(|identifier| {
                    let terminal = Terminal::FetchFailed {
                        reason: reason.clone(),
                    };
                    (identifier, terminal)
                }));
                return outcomes;
            }
        };

        let mut by_query = split_hits(hits);
        for identifier in pending {
            let terminal = match by_query.remove(identifier.as_str()) {
                Some(hit) => self.persist_hit(&identifier, hit).await,
                None => {
                    info!(identifier = %identifier, "no results found");
                    Terminal::Invalid {
                        reason: NOT_FOUND.to_string(),
                    }
                }
            };
            outcomes.push((identifier, terminal));
        }
        outcomes
    }
}
