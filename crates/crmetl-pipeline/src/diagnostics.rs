//! Per-row findings produced by the cleaners, and the run-wide log that collects them.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingId,
    MissingName,
    MissingEmail,
    DuplicateEmail,
    MissingRevenue,
    NegativeRevenue,
    MissingAmount,
    NegativeAmount,
    InvalidCreatedDate,
    InvalidCloseDate,
    CloseNotAfterCreated,
    InvalidTimestamp,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::MissingId => "missing id",
            DropReason::MissingName => "missing name",
            DropReason::MissingEmail => "missing email",
            DropReason::DuplicateEmail => "duplicate email",
            DropReason::MissingRevenue => "missing annual_revenue",
            DropReason::NegativeRevenue => "negative annual_revenue",
            DropReason::MissingAmount => "missing amount",
            DropReason::NegativeAmount => "negative amount",
            DropReason::InvalidCreatedDate => "invalid created_date",
            DropReason::InvalidCloseDate => "invalid close_date",
            DropReason::CloseNotAfterCreated => "close_date not after created_date",
            DropReason::InvalidTimestamp => "invalid timestamp",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    RowDropped {
        table: &'static str,
        id: Option<String>,
        reason: DropReason,
    },
    /// A phone value that could not be normalised; the row is kept without a phone.
    PhoneDiscarded {
        contact_id: Option<String>,
        raw: String,
    },
    ContactRemapped {
        table: &'static str,
        id: Option<String>,
        from: String,
        to: String,
    },
    /// A `contact_id` that names no surviving contact and was left unchanged.
    ContactUnresolved {
        table: &'static str,
        id: Option<String>,
        contact_id: String,
    },
}

impl Diagnostic {
    fn emit(&self, stage: Stage) {
        match self {
            Diagnostic::RowDropped { table, id, reason } => {
                debug!(%stage, table, id = id.as_deref().unwrap_or("<null>"), %reason, "dropped row");
            }
            Diagnostic::PhoneDiscarded { contact_id, raw } => {
                warn!(
                    %stage,
                    contact_id = contact_id.as_deref().unwrap_or("<null>"),
                    raw = raw.as_str(),
                    "error cleaning phone number; value discarded"
                );
            }
            Diagnostic::ContactRemapped { table, id, from, to } => {
                debug!(
                    %stage,
                    table,
                    id = id.as_deref().unwrap_or("<null>"),
                    from = from.as_str(),
                    to = to.as_str(),
                    "contact_id remapped to surviving contact"
                );
            }
            Diagnostic::ContactUnresolved { table, id, contact_id } => {
                debug!(
                    %stage,
                    table,
                    id = id.as_deref().unwrap_or("<null>"),
                    contact_id = contact_id.as_str(),
                    "contact_id left unresolved"
                );
            }
        }
    }
}

/// A cleaned table together with what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned<T> {
    pub rows: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Cleaned<T> {
    pub fn new(rows: Vec<T>, diagnostics: Vec<Diagnostic>) -> Self {
        Self { rows, diagnostics }
    }

    pub fn dropped(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::RowDropped { .. }))
            .count()
    }
}

/// Run-wide diagnostics handle. Created once per run by the pipeline and fed the
/// output of each stage in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage's diagnostics and hand back its rows.
    pub fn absorb<T>(&mut self, stage: Stage, cleaned: Cleaned<T>) -> Vec<T> {
        let dropped = cleaned.dropped();
        for diagnostic in &cleaned.diagnostics {
            diagnostic.emit(stage);
        }
        info!(%stage, rows = cleaned.rows.len(), dropped, "stage complete");
        self.entries.extend(cleaned.diagnostics);
        cleaned.rows
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn dropped_rows(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::RowDropped { .. }))
    }

    pub fn remapped_contact_ids(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::ContactRemapped { .. }))
    }

    pub fn unresolved_contact_ids(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::ContactUnresolved { .. }))
    }

    pub fn discarded_phones(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::PhoneDiscarded { .. }))
    }

    fn count(&self, pred: impl Fn(&Diagnostic) -> bool) -> usize {
        self.entries.iter().filter(|d| pred(d)).count()
    }
}
