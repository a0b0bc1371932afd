//! ETL run orchestration: extract the four source files, clean them in
//! dependency order, and replace the database contents in one transaction.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use crmetl_adapters::extract_from_file;
use crmetl_core::{decode_table, Dataset, Entity, Table, TableCounts};
use crmetl_storage::SqliteStore;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub mod cleaners;
pub mod config;
pub mod diagnostics;
pub mod fields;
pub mod reconcile;

use cleaners::{ActivityCleaner, Cleaner, CompanyCleaner, OpportunityCleaner};
use config::{ConfigError, PipelineConfig};
use diagnostics::DiagnosticLog;
use reconcile::clean_contacts_and_reconcile;

pub const CRATE_NAME: &str = "crmetl-pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Companies,
    Contacts,
    Opportunities,
    Activities,
}

impl TableKind {
    /// Dependency order: every table comes after the tables it references.
    pub const ALL: [TableKind; 4] = [
        TableKind::Companies,
        TableKind::Contacts,
        TableKind::Opportunities,
        TableKind::Activities,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Companies => "companies",
            TableKind::Contacts => "contacts",
            TableKind::Opportunities => "opportunities",
            TableKind::Activities => "activities",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract(TableKind),
    Clean(TableKind),
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extract(kind) => write!(f, "extract {kind}"),
            Stage::Clean(kind) => write!(f, "clean {kind}"),
            Stage::Persist => f.write_str("persist"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            PipelineError::Config(_) => None,
        }
    }
}

/// Log a stage failure and wrap it. Every stage error passes through here.
fn stage_failure(stage: Stage, err: impl Into<anyhow::Error>) -> PipelineError {
    let source = err.into();
    error!(%stage, error = %source, "error during {stage}");
    PipelineError::Stage { stage, source }
}

/// The four tables as read from disk, before decoding.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub companies: Table,
    pub contacts: Table,
    pub opportunities: Table,
    pub activities: Table,
}

impl SourceTables {
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            companies: self.companies.len(),
            contacts: self.contacts.len(),
            opportunities: self.opportunities.len(),
            activities: self.activities.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanRun {
    pub dataset: Dataset,
    pub diagnostics: DiagnosticLog,
}

fn decode<E: Entity>(stage: Stage, table: &Table) -> Result<Vec<E>, PipelineError> {
    decode_table(table).map_err(|err| stage_failure(stage, err))
}

/// Clean all four tables in dependency order. The contacts step also rewrites
/// `contact_id` in opportunities and activities before they are cleaned.
pub fn clean_tables(sources: &SourceTables) -> Result<CleanRun, PipelineError> {
    let mut log = DiagnosticLog::new();

    let stage = Stage::Clean(TableKind::Companies);
    let companies = decode(stage, &sources.companies)?;
    let companies = log.absorb(stage, CompanyCleaner.clean(companies));

    let stage = Stage::Clean(TableKind::Contacts);
    let outcome = clean_contacts_and_reconcile(
        decode(stage, &sources.contacts)?,
        decode(stage, &sources.opportunities)?,
        decode(stage, &sources.activities)?,
    );
    info!(merged_ids = outcome.canonical_ids.merged(), "contact ids reconciled");
    let contacts = log.absorb(stage, outcome.contacts);
    let opportunities = log.absorb(stage, outcome.opportunities);
    let activities = log.absorb(stage, outcome.activities);

    let stage = Stage::Clean(TableKind::Opportunities);
    let opportunities = log.absorb(stage, OpportunityCleaner.clean(opportunities));

    let stage = Stage::Clean(TableKind::Activities);
    let activities = log.absorb(stage, ActivityCleaner.clean(activities));

    Ok(CleanRun {
        dataset: Dataset {
            companies,
            contacts,
            opportunities,
            activities,
        },
        diagnostics: log,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extracted: TableCounts,
    pub persisted: TableCounts,
    pub dropped_rows: usize,
    pub remapped_contact_ids: usize,
    pub discarded_phones: usize,
}

pub struct EtlPipeline {
    config: PipelineConfig,
}

impl EtlPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extract(&self) -> Result<SourceTables, PipelineError> {
        let read = |kind: TableKind| {
            let path = self.config.file_paths.path_for(kind);
            let table = extract_from_file(path).map_err(|err| stage_failure(Stage::Extract(kind), err))?;
            info!(table = %kind, rows = table.len(), path = %path.display(), "extracted");
            Ok::<_, PipelineError>(table)
        };
        Ok(SourceTables {
            companies: read(TableKind::Companies)?,
            contacts: read(TableKind::Contacts)?,
            opportunities: read(TableKind::Opportunities)?,
            activities: read(TableKind::Activities)?,
        })
    }

    async fn open_store(&self) -> Result<SqliteStore, PipelineError> {
        SqliteStore::connect(&self.config.database_path.database_name)
            .await
            .map_err(|err| stage_failure(Stage::Persist, err))
    }

    /// Replace the database contents with `dataset`.
    pub async fn persist(&self, dataset: &Dataset) -> Result<TableCounts, PipelineError> {
        let store = self.open_store().await?;
        let result = store.replace_all(dataset).await;
        store.close().await;
        result.map_err(|err| stage_failure(Stage::Persist, err))
    }

    /// Create the fixed schema in the configured database without loading data.
    pub async fn init_schema(&self) -> Result<(), PipelineError> {
        let store = self.open_store().await?;
        let result = store.init_schema().await;
        store.close().await;
        result.map_err(|err| stage_failure(Stage::Persist, err))
    }

    pub async fn run_once(&self) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("etl_run", %run_id);
        self.run_in_span(run_id).instrument(span).await
    }

    async fn run_in_span(&self, run_id: Uuid) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        info!("starting ETL run");

        let sources = self.extract()?;
        let CleanRun { dataset, diagnostics } = clean_tables(&sources)?;
        let persisted = self.persist(&dataset).await?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            extracted: sources.counts(),
            persisted,
            dropped_rows: diagnostics.dropped_rows(),
            remapped_contact_ids: diagnostics.remapped_contact_ids(),
            discarded_phones: diagnostics.discarded_phones(),
        };
        info!(
            extracted = summary.extracted.total(),
            persisted = summary.persisted.total(),
            dropped_rows = summary.dropped_rows,
            remapped_contact_ids = summary.remapped_contact_ids,
            unresolved_contact_ids = diagnostics.unresolved_contact_ids(),
            discarded_phones = summary.discarded_phones,
            "ETL run finished"
        );
        Ok(summary)
    }
}

pub async fn run_once_from_config(path: impl AsRef<Path>) -> Result<RunSummary, PipelineError> {
    let config = PipelineConfig::load(path)?;
    EtlPipeline::new(config).run_once().await
}
