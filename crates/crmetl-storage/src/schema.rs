//! Fixed relational schema for the four CRM tables.

pub const COMPANIES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS Companies (
    id TEXT PRIMARY KEY,
    name TEXT,
    domain TEXT,
    industry TEXT,
    size TEXT,
    country TEXT,
    created_date TEXT,
    is_customer INTEGER,
    annual_revenue INTEGER
)
"#;

pub const CONTACTS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS Contacts (
    id TEXT PRIMARY KEY,
    email TEXT UNIQUE,
    first_name TEXT,
    last_name TEXT,
    title TEXT,
    company_id TEXT,
    phone TEXT,
    status TEXT,
    created_date TEXT,
    last_modified TEXT,
    FOREIGN KEY (company_id) REFERENCES Companies(id)
)
"#;

pub const OPPORTUNITIES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS Opportunities (
    id TEXT PRIMARY KEY,
    name TEXT,
    contact_id TEXT,
    company_id TEXT,
    amount INTEGER,
    stage TEXT,
    product TEXT,
    probability INTEGER,
    created_date TEXT,
    close_date TEXT,
    is_closed INTEGER,
    forecast_category TEXT,
    FOREIGN KEY (contact_id) REFERENCES Contacts(id),
    FOREIGN KEY (company_id) REFERENCES Companies(id)
)
"#;

pub const ACTIVITIES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS Activities (
    id TEXT PRIMARY KEY,
    contact_id TEXT,
    opportunity_id TEXT,
    type TEXT,
    subject TEXT,
    timestamp TEXT,
    duration_minutes INTEGER,
    outcome TEXT,
    notes TEXT,
    FOREIGN KEY (contact_id) REFERENCES Contacts(id),
    FOREIGN KEY (opportunity_id) REFERENCES Opportunities(id)
)
"#;

/// Tables in dependency order.
pub const SCHEMA: &[(&str, &str)] = &[
    ("Companies", COMPANIES_DDL),
    ("Contacts", CONTACTS_DDL),
    ("Opportunities", OPPORTUNITIES_DDL),
    ("Activities", ACTIVITIES_DDL),
];

pub fn create_table_sql(table: &str) -> Option<&'static str> {
    SCHEMA
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, ddl)| *ddl)
}

pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    let quoted = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO {table} ({quoted}) VALUES ({placeholders})")
}
