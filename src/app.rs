use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::domain::{Identifier, SourceKind};
use crate::entities::{CsvEntitySource, EntitySource};
use crate::error::HarvestError;
use crate::extract::PageExtractor;
use crate::fetcher::Fetcher;
use crate::http::{DirectTransport, build_client};
use crate::interactions::{InteractionExtractor, InteractionValidator};
use crate::limiter::RateGate;
use crate::mygene::{MetadataHarvester, MyGeneHttpClient};
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::pipeline::Pipeline;
use crate::render::{ChromeLauncher, RenderedTransport};
use crate::store::FsStore;
use crate::validate::PageValidator;

/// Wires configured sources to the orchestrator.
pub struct App {
    config: ResolvedConfig,
    client: Client,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Result<Self, HarvestError> {
        let client = build_client(config.http_timeout)?;
        Ok(Self { config, client })
    }

    /// Reads the identifier list, from `path` when given, otherwise from the
    /// configured location.
    pub fn load_identifiers(&self, path: Option<&Path>) -> Result<Vec<Identifier>, HarvestError> {
        let settings = &self.config.identifiers;
        let path = path.unwrap_or(settings.path.as_std_path());
        let source = CsvEntitySource::new(path, settings.column.clone(), settings.policy);
        let identifiers = source.identifiers()?;
        info!(path = %path.display(), count = identifiers.len(), "loaded identifiers");
        Ok(identifiers)
    }

    pub async fn run(
        &self,
        source: SourceKind,
        identifiers: Vec<Identifier>,
    ) -> Result<RunSummary, HarvestError> {
        match source {
            SourceKind::Interactions => self.run_interactions(identifiers).await,
            SourceKind::Metadata => self.run_metadata(identifiers).await,
            SourceKind::Pages => self.run_pages(identifiers).await,
        }
    }

    pub async fn run_all(&self, identifiers: Vec<Identifier>) -> Result<Vec<RunSummary>, HarvestError> {
        let mut summaries = Vec::new();
        for source in [SourceKind::Interactions, SourceKind::Metadata, SourceKind::Pages] {
            summaries.push(self.run(source, identifiers.clone()).await?);
        }
        Ok(summaries)
    }

    async fn run_interactions(&self, identifiers: Vec<Identifier>) -> Result<RunSummary, HarvestError> {
        let settings = &self.config.interactions;
        let access_key = settings.require_access_key()?;
        let transport = DirectTransport::new(self.client.clone(), settings.base_url.clone(), "geneList")
            .with_query("accesskey", access_key)
            .with_query("searchNames", "true")
            .with_query("format", "tab2");
        let store = FsStore::new(settings.output_dir.clone(), "_interactions.csv");
        store.ensure_dirs().await?;

        let pipeline = Pipeline::new(
            SourceKind::Interactions,
            Fetcher::new(transport, settings.retry),
            InteractionValidator,
            InteractionExtractor,
            Arc::new(store),
        );
        Ok(Orchestrator::new(settings.concurrency)
            .run(Arc::new(pipeline), identifiers)
            .await)
    }

    async fn run_metadata(&self, identifiers: Vec<Identifier>) -> Result<RunSummary, HarvestError> {
        let settings = &self.config.metadata;
        let store = FsStore::new(settings.output_dir.clone(), ".json");
        store.ensure_dirs().await?;

        let harvester = MetadataHarvester::new(
            MyGeneHttpClient::new(self.client.clone(), settings.base_url.clone()),
            settings.retry,
            Arc::new(RateGate::new(settings.min_interval)),
            settings.batch_size,
            Arc::new(store),
        );
        Ok(Orchestrator::new(settings.concurrency)
            .run(Arc::new(harvester), identifiers)
            .await)
    }

    async fn run_pages(&self, identifiers: Vec<Identifier>) -> Result<RunSummary, HarvestError> {
        let settings = &self.config.pages;
        let render = &settings.render;
        let store = FsStore::new(settings.json_dir.clone(), ".json").with_snapshots(settings.html_dir.clone());
        store.ensure_dirs().await?;

        let transport = RenderedTransport::new(
            ChromeLauncher::new(render.launch.clone()),
            settings.base_url.clone(),
            render.marker_selector.clone(),
            render.wait_timeout,
        );
        let pipeline = Pipeline::new(
            SourceKind::Pages,
            Fetcher::new(transport, settings.retry),
            PageValidator,
            PageExtractor,
            Arc::new(store),
        );
        Ok(Orchestrator::new(settings.concurrency)
            .run(Arc::new(pipeline), identifiers)
            .await)
    }
}
