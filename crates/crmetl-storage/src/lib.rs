//! SQLite persistence for cleaned CRM tables.

pub mod schema;

use std::path::{Path, PathBuf};

use crmetl_core::{Cell, Dataset, Entity, TableCounts};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Transaction};
use thiserror::Error;
use tracing::{debug, info};

pub const CRATE_NAME: &str = "crmetl-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening database {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
    #[error("no schema defined for table {0}")]
    UnknownTable(String),
    #[error("{operation} on table {table}: {source}")]
    Table {
        table: String,
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("{operation} transaction: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    fn table<'a>(table: &'a str, operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self + 'a {
        move |source| StoreError::Table {
            table: table.to_string(),
            operation,
            source,
        }
    }
}

/// Single-writer handle on the target SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if missing) the database file. Foreign keys are not
    /// enforced: cleaned tables may carry references to rows that never existed.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Connect {
                path: path.clone(),
                source,
            })?;
        debug!(database = %path.display(), "opened sqlite database");
        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create any missing table of the fixed schema. Existing tables are left as they are.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for (table, ddl) in schema::SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(StoreError::table(table, "create"))?;
        }
        info!(database = %self.path.display(), "schema initialised");
        Ok(())
    }

    /// Replace all four tables with `dataset` and commit once. On any failure the
    /// transaction is rolled back and the previous contents remain.
    pub async fn replace_all(&self, dataset: &Dataset) -> Result<TableCounts, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| StoreError::Transaction {
                operation: "begin",
                source,
            })?;

        let counts = TableCounts {
            companies: replace_table(&mut tx, &dataset.companies).await?,
            contacts: replace_table(&mut tx, &dataset.contacts).await?,
            opportunities: replace_table(&mut tx, &dataset.opportunities).await?,
            activities: replace_table(&mut tx, &dataset.activities).await?,
        };

        tx.commit()
            .await
            .map_err(|source| StoreError::Transaction {
                operation: "commit",
                source,
            })?;

        info!(
            database = %self.path.display(),
            companies = counts.companies,
            contacts = counts.contacts,
            opportunities = counts.opportunities,
            activities = counts.activities,
            "saved all tables to sqlite"
        );
        Ok(counts)
    }

    pub async fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        if schema::create_table_sql(table).is_none() {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::table(table, "count"))?;
        row.try_get::<i64, _>("n")
            .map_err(StoreError::table(table, "count"))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn replace_table<E: Entity>(
    tx: &mut Transaction<'_, Sqlite>,
    records: &[E],
) -> Result<usize, StoreError> {
    let ddl = schema::create_table_sql(E::TABLE)
        .ok_or_else(|| StoreError::UnknownTable(E::TABLE.to_string()))?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", E::TABLE))
        .execute(&mut **tx)
        .await
        .map_err(StoreError::table(E::TABLE, "drop"))?;
    sqlx::query(ddl)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::table(E::TABLE, "create"))?;

    let insert = schema::insert_sql(E::TABLE, E::COLUMNS);
    for record in records {
        let query = record
            .cells()
            .into_iter()
            .fold(sqlx::query(&insert), bind_cell);
        query
            .execute(&mut **tx)
            .await
            .map_err(StoreError::table(E::TABLE, "insert"))?;
    }

    debug!(table = E::TABLE, rows = records.len(), "replaced table");
    Ok(records.len())
}

fn bind_cell<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    cell: Cell,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match cell {
        Cell::Null => query.bind(None::<String>),
        Cell::Text(s) => query.bind(s),
        Cell::Integer(i) => query.bind(i),
        Cell::Float(f) => query.bind(f),
        Cell::Bool(b) => query.bind(i64::from(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmetl_core::{Company, Contact, Opportunity};
    use tempfile::tempdir;

    fn company(id: &str, name: &str) -> Company {
        Company {
            id: Some(id.into()),
            name: Some(name.into()),
            annual_revenue: Some(1000),
            ..Default::default()
        }
    }

    fn contact(id: &str, email: &str) -> Contact {
        Contact {
            id: Some(id.into()),
            email: Some(email.into()),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn init_schema_creates_the_four_tables() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::connect(dir.path().join("crm.db")).await.expect("connect");
        store.init_schema().await.expect("schema");
        store.init_schema().await.expect("schema is idempotent");

        for (table, _) in schema::SCHEMA {
            assert_eq!(store.row_count(table).await.expect("count"), 0);
        }
        assert!(matches!(
            store.row_count("Leads").await,
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn replace_all_overwrites_previous_contents() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::connect(dir.path().join("crm.db")).await.expect("connect");

        let first = Dataset {
            companies: vec![company("c1", "Acme"), company("c2", "Globex")],
            ..Default::default()
        };
        store.replace_all(&first).await.expect("first write");
        assert_eq!(store.row_count("Companies").await.unwrap(), 2);

        let second = Dataset {
            companies: vec![company("c3", "Initech")],
            contacts: vec![contact("p1", "ada@example.com")],
            ..Default::default()
        };
        let counts = store.replace_all(&second).await.expect("second write");
        assert_eq!(counts.companies, 1);
        assert_eq!(counts.contacts, 1);
        assert_eq!(store.row_count("Companies").await.unwrap(), 1);

        let name: String = sqlx::query_scalar("SELECT name FROM Companies")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(name, "Initech");
    }

    #[tokio::test]
    async fn dangling_references_are_persisted() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::connect(dir.path().join("crm.db")).await.expect("connect");

        let dataset = Dataset {
            opportunities: vec![Opportunity {
                id: Some("o1".into()),
                name: Some("Renewal".into()),
                contact_id: Some("nonexistent".into()),
                amount: Some(10),
                ..Default::default()
            }],
            ..Default::default()
        };
        store.replace_all(&dataset).await.expect("write");

        let contact_id: String = sqlx::query_scalar("SELECT contact_id FROM Opportunities")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(contact_id, "nonexistent");
    }

    #[tokio::test]
    async fn failed_write_keeps_prior_state() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::connect(dir.path().join("crm.db")).await.expect("connect");

        let good = Dataset {
            companies: vec![company("c1", "Acme")],
            contacts: vec![contact("p1", "ada@example.com")],
            ..Default::default()
        };
        store.replace_all(&good).await.expect("good write");

        let bad = Dataset {
            companies: vec![company("c9", "Umbrella")],
            contacts: vec![contact("p2", "bob@example.com"), contact("p2", "carol@example.com")],
            ..Default::default()
        };
        let err = store.replace_all(&bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Table { operation: "insert", .. }));

        assert_eq!(store.row_count("Companies").await.unwrap(), 1);
        let id: String = sqlx::query_scalar("SELECT id FROM Contacts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(id, "p1");
    }

    #[tokio::test]
    async fn contacts_without_names_are_stored() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::connect(dir.path().join("crm.db")).await.expect("connect");

        let mut nameless = contact("p1", "ada@example.com");
        nameless.first_name = None;
        nameless.last_name = None;
        let dataset = Dataset {
            contacts: vec![nameless],
            opportunities: vec![Opportunity {
                id: Some("o1".into()),
                contact_id: Some("p1".into()),
                amount: Some(5),
                ..Default::default()
            }],
            ..Default::default()
        };
        let counts = store.replace_all(&dataset).await.expect("write");
        assert_eq!(counts.contacts, 1);
        assert_eq!(counts.opportunities, 1);

        let first_name: Option<String> = sqlx::query_scalar("SELECT first_name FROM Contacts")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(first_name, None);
    }
}
