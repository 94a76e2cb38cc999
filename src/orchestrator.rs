use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{Identifier, SourceKind};
use crate::limiter::ConcurrencyLimiter;
use crate::pipeline::Terminal;

/// A source the orchestrator can drive. One call handles one unit of work
/// (a single identifier, or a batch for sources that query in batches) and
/// runs while holding one concurrency slot.
#[async_trait]
pub trait Harvest: Send + Sync + 'static {
    fn source(&self) -> SourceKind;

    fn batch_size(&self) -> usize {
        1
    }

    /// Must report a terminal state for every identifier it was given.
    async fn harvest(&self, identifiers: Vec<Identifier>) -> Vec<(Identifier, Terminal)>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub identifier: Identifier,
    #[serde(flatten)]
    pub terminal: Terminal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: SourceKind,
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub persisted: usize,
    pub warnings: usize,
    pub cached: usize,
    pub fetch_failed: usize,
    pub invalid: usize,
    pub persist_failed: usize,
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    fn new(source: SourceKind, started_at: String) -> Self {
        Self {
            source,
            started_at,
            finished_at: String::new(),
            total: 0,
            persisted: 0,
            warnings: 0,
            cached: 0,
            fetch_failed: 0,
            invalid: 0,
            persist_failed: 0,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, identifier: Identifier, terminal: Terminal) {
        self.total += 1;
        match &terminal {
            Terminal::Cached => self.cached += 1,
            Terminal::Persisted { warning } => {
                self.persisted += 1;
                if warning.is_some() {
                    self.warnings += 1;
                }
            }
            Terminal::FetchFailed { .. } => self.fetch_failed += 1,
            Terminal::Invalid { .. } => self.invalid += 1,
            Terminal::PersistFailed { .. } => self.persist_failed += 1,
        }
        self.outcomes.push(Outcome {
            identifier,
            terminal,
        });
    }

    pub fn failures(&self) -> usize {
        self.fetch_failed + self.invalid + self.persist_failed
    }

    pub fn outcome(&self, identifier: &Identifier) -> Option<&Terminal> {
        self.outcomes
            .iter()
            .find(|outcome| &outcome.identifier == identifier)
            .map(|outcome| &outcome.terminal)
    }
}

/// Runs every identifier of a source to a terminal state, bounded by the
/// concurrency limit. Failures stay with their identifier.
pub struct Orchestrator {
    limiter: ConcurrencyLimiter,
}

impl Orchestrator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            limiter: ConcurrencyLimiter::new(concurrency),
        }
    }

    pub async fn run<H: Harvest>(&self, harvest: Arc<H>, identifiers: Vec<Identifier>) -> RunSummary {
        let source = harvest.source();
        let mut summary = RunSummary::new(source, timestamp());
        let identifiers = dedup(identifiers);
        info!(
            source = %source,
            identifiers = identifiers.len(),
            concurrency = self.limiter.limit(),
            "starting run"
        );

        let mut tasks: Vec<(Vec<Identifier>, JoinHandle<Vec<(Identifier, Terminal)>>)> = Vec::new();
        for unit in identifiers.chunks(harvest.batch_size().max(1)) {
            let unit = unit.to_vec();
            let harvest = Arc::clone(&harvest);
            let limiter = self.limiter.clone();
            let handle = tokio::spawn({
                let unit = unit.clone();
                async move {
                    let _slot = match limiter.acquire().await {
                        Ok(slot) => slot,
                        Err(err) => return unassigned(unit, &err.to_string()),
                    };
                    harvest.harvest(unit).await
                }
            });
            tasks.push((unit, handle));
        }

        for (unit, handle) in tasks {
            let results = match handle.await {
                Ok(results) => results,
                Err(err) => {
                    error!(source = %source, first = %unit[0], error = %err, "harvest task failed");
                    unassigned(unit, &format!("harvest task failed: {err}"))
                }
            };
            for (identifier, terminal) in results {
                summary.record(identifier, terminal);
            }
        }

        summary.finished_at = timestamp();
        info!(
            source = %source,
            total = summary.total,
            persisted = summary.persisted,
            warnings = summary.warnings,
            cached = summary.cached,
            failed = summary.failures(),
            "run complete"
        );
        summary
    }
}

fn unassigned(unit: Vec<Identifier>, reason: &str) -> Vec<(Identifier, Terminal)> {
    unit.into_iter()
        .map(|identifier| {
            let terminal = Terminal::FetchFailed {
                reason: reason.to_string(),
            };
            (identifier, terminal)
        })
        .collect()
}

/// Keeps the first occurrence so no two pipelines in one run share a path.
fn dedup(identifiers: Vec<Identifier>) -> Vec<Identifier> {
    let mut seen = HashSet::new();
    identifiers
        .into_iter()
        .filter(|identifier| seen.insert(identifier.clone()))
        .collect()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let ids: Vec<Identifier> = ["TP53", "EGFR", "TP53", "BRCA1", "EGFR"]
            .iter()
            .map(|raw| raw.parse().unwrap())
            .collect();
        let names: Vec<String> = dedup(ids).iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["TP53", "EGFR", "BRCA1"]);
    }

    #[test]
    fn summary_counts_by_terminal() {
        let mut summary = RunSummary::new(SourceKind::Pages, timestamp());
        summary.record("A1".parse().unwrap(), Terminal::Cached);
        summary.record(
            "B2".parse().unwrap(),
            Terminal::Persisted {
                warning: Some("low data".to_string()),
            },
        );
        summary.record(
            "C3".parse().unwrap(),
            Terminal::FetchFailed {
                reason: "timeout".to_string(),
            },
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.failures(), 1);
        assert_eq!(
            summary.outcome(&"A1".parse().unwrap()),
            Some(&Terminal::Cached)
        );
    }
}
