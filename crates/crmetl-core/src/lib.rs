//! Tabular model and CRM entity records shared by the crmetl crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "crmetl-core";

/// A single loosely-typed value as read from a source file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

static NULL_CELL: Cell = Cell::Null;

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Text rendering of the cell. Integral floats drop their fractional part so
    /// that `1.0` read from JSON and `1` read from CSV name the same identifier.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Integer(i) => Some(i.to_string()),
            Cell::Float(f) if !f.is_finite() => None,
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some((*f as i64).to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Integer view of the cell. Fractional values round down, so `0.5` stores
    /// as `0` and `-0.5` as `-1`: the sign of the source value always survives
    /// and `>= 0` checks on the integer agree with the raw number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Null => None,
            Cell::Integer(i) => Some(*i),
            Cell::Float(f) => float_to_i64(*f),
            Cell::Bool(b) => Some(i64::from(*b)),
            Cell::Text(s) => parse_integer_text(s),
        }
    }
}

fn parse_integer_text(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Some(1);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Some(0);
    }
    trimmed.parse::<f64>().ok().and_then(float_to_i64)
}

fn float_to_i64(f: f64) -> Option<i64> {
    f.is_finite().then(|| f.floor() as i64)
}

impl From<Option<&String>> for Cell {
    fn from(value: Option<&String>) -> Self {
        value.map_or(Cell::Null, |s| Cell::Text(s.clone()))
    }
}

impl From<Option<i64>> for Cell {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Cell::Null, Cell::Integer)
    }
}

/// One source record keyed by column name. Absent columns read as [`Cell::Null`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: BTreeMap<String, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> &Cell {
        self.cells.get(column).unwrap_or(&NULL_CELL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Cell) {
        self.cells.insert(column.into(), value);
    }

    pub fn with(mut self, column: impl Into<String>, value: Cell) -> Self {
        self.set(column, value);
        self
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).as_text()
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).as_i64()
    }
}

/// Ordered rows sharing a column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("table {table} is missing required column `{column}`")]
    MissingColumn { table: &'static str, column: &'static str },
}

/// A record type with a fixed persisted schema.
pub trait Entity: Sized {
    /// Persisted table name.
    const TABLE: &'static str;
    /// Persisted column order.
    const COLUMNS: &'static [&'static str];
    /// Columns a cleaning step reads; a source table without them cannot be decoded.
    const REQUIRED_COLUMNS: &'static [&'static str];

    fn from_row(row: &Row) -> Self;

    /// Values in [`Entity::COLUMNS`] order.
    fn cells(&self) -> Vec<Cell>;

    fn id(&self) -> Option<&str>;
}

/// Decode every row of `table` into `E`. Columns outside the fixed schema are ignored.
pub fn decode_table<E: Entity>(table: &Table) -> Result<Vec<E>, DecodeError> {
    if let Some(column) = E::REQUIRED_COLUMNS
        .iter()
        .find(|column| !table.has_column(column))
    {
        return Err(DecodeError::MissingColumn {
            table: E::TABLE,
            column: *column,
        });
    }
    Ok(table.rows().iter().map(E::from_row).collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Company {
    pub id: Option<String>,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub country: Option<String>,
    pub created_date: Option<String>,
    pub is_customer: Option<i64>,
    pub annual_revenue: Option<i64>,
}

impl Entity for Company {
    const TABLE: &'static str = "Companies";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "domain",
        "industry",
        "size",
        "country",
        "created_date",
        "is_customer",
        "annual_revenue",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "name", "industry", "annual_revenue"];

    fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id"),
            name: row.text("name"),
            domain: row.text("domain"),
            industry: row.text("industry"),
            size: row.text("size"),
            country: row.text("country"),
            created_date: row.text("created_date"),
            is_customer: row.int("is_customer"),
            annual_revenue: row.int("annual_revenue"),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.id.as_ref().into(),
            self.name.as_ref().into(),
            self.domain.as_ref().into(),
            self.industry.as_ref().into(),
            self.size.as_ref().into(),
            self.country.as_ref().into(),
            self.created_date.as_ref().into(),
            self.is_customer.into(),
            self.annual_revenue.into(),
        ]
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    pub id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub company_id: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub created_date: Option<String>,
    pub last_modified: Option<String>,
}

impl Entity for Contact {
    const TABLE: &'static str = "Contacts";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "email",
        "first_name",
        "last_name",
        "title",
        "company_id",
        "phone",
        "status",
        "created_date",
        "last_modified",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "email", "phone", "title"];

    fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id"),
            email: row.text("email"),
            first_name: row.text("first_name"),
            last_name: row.text("last_name"),
            title: row.text("title"),
            company_id: row.text("company_id"),
            phone: row.text("phone"),
            status: row.text("status"),
            created_date: row.text("created_date"),
            last_modified: row.text("last_modified"),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.id.as_ref().into(),
            self.email.as_ref().into(),
            self.first_name.as_ref().into(),
            self.last_name.as_ref().into(),
            self.title.as_ref().into(),
            self.company_id.as_ref().into(),
            self.phone.as_ref().into(),
            self.status.as_ref().into(),
            self.created_date.as_ref().into(),
            self.last_modified.as_ref().into(),
        ]
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Option<String>,
    pub name: Option<String>,
    pub contact_id: Option<String>,
    pub company_id: Option<String>,
    pub amount: Option<i64>,
    pub stage: Option<String>,
    pub product: Option<String>,
    pub probability: Option<i64>,
    pub created_date: Option<String>,
    pub close_date: Option<String>,
    pub is_closed: Option<i64>,
    pub forecast_category: Option<String>,
}

impl Entity for Opportunity {
    const TABLE: &'static str = "Opportunities";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "contact_id",
        "company_id",
        "amount",
        "stage",
        "product",
        "probability",
        "created_date",
        "close_date",
        "is_closed",
        "forecast_category",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["contact_id", "amount", "created_date", "close_date"];

    fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id"),
            name: row.text("name"),
            contact_id: row.text("contact_id"),
            company_id: row.text("company_id"),
            amount: row.int("amount"),
            stage: row.text("stage"),
            product: row.text("product"),
            probability: row.int("probability"),
            created_date: row.text("created_date"),
            close_date: row.text("close_date"),
            is_closed: row.int("is_closed"),
            forecast_category: row.text("forecast_category"),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.id.as_ref().into(),
            self.name.as_ref().into(),
            self.contact_id.as_ref().into(),
            self.company_id.as_ref().into(),
            self.amount.into(),
            self.stage.as_ref().into(),
            self.product.as_ref().into(),
            self.probability.into(),
            self.created_date.as_ref().into(),
            self.close_date.as_ref().into(),
            self.is_closed.into(),
            self.forecast_category.as_ref().into(),
        ]
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Activity {
    pub id: Option<String>,
    pub contact_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub activity_type: Option<String>,
    pub subject: Option<String>,
    pub timestamp: Option<String>,
    pub duration_minutes: Option<i64>,
    pub outcome: Option<String>,
    pub notes: Option<String>,
}

impl Entity for Activity {
    const TABLE: &'static str = "Activities";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "contact_id",
        "opportunity_id",
        "type",
        "subject",
        "timestamp",
        "duration_minutes",
        "outcome",
        "notes",
    ];
    const REQUIRED_COLUMNS: &'static [&'static str] = &["contact_id", "timestamp"];

    fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id"),
            contact_id: row.text("contact_id"),
            opportunity_id: row.text("opportunity_id"),
            activity_type: row.text("type"),
            subject: row.text("subject"),
            timestamp: row.text("timestamp"),
            duration_minutes: row.int("duration_minutes"),
            outcome: row.text("outcome"),
            notes: row.text("notes"),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.id.as_ref().into(),
            self.contact_id.as_ref().into(),
            self.opportunity_id.as_ref().into(),
            self.activity_type.as_ref().into(),
            self.subject.as_ref().into(),
            self.timestamp.as_ref().into(),
            self.duration_minutes.into(),
            self.outcome.as_ref().into(),
            self.notes.as_ref().into(),
        ]
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// The four cleaned tables of one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub companies: Vec<Company>,
    pub contacts: Vec<Contact>,
    pub opportunities: Vec<Opportunity>,
    pub activities: Vec<Activity>,
}

impl Dataset {
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            companies: self.companies.len(),
            contacts: self.contacts.len(),
            opportunities: self.opportunities.len(),
            activities: self.activities.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableCounts {
    pub companies: usize,
    pub contacts: usize,
    pub opportunities: usize,
    pub activities: usize,
}

impl TableCounts {
    pub fn total(&self) -> usize {
        self.companies + self.contacts + self.opportunities + self.activities
    }
}
