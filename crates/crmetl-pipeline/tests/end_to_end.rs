use std::fs;
use std::path::Path;

use crmetl_pipeline::{run_once_from_config, PipelineError, Stage, TableKind};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;

fn write_config(dir: &Path, contacts_file: &str) -> std::path::PathBuf {
    let config = format!(
        "file_paths:\n  companies_data: {d}/companies.csv\n  contacts_data: {d}/{contacts_file}\n  opportunities_data: {d}/opportunities.csv\n  activities_data: {d}/activities.json\ndatabase_path:\n  database_name: {d}/crm.db\nlog_paths:\n  log_file: {d}/etl.log\n",
        d = dir.display(),
    );
    let path = dir.join("config.yml");
    fs::write(&path, config).expect("write config");
    path
}

fn write_inputs(dir: &Path) {
    fs::write(
        dir.join("companies.csv"),
        "id,name,domain,industry,size,country,created_date,is_customer,annual_revenue\n\
         co1, acme corp ,acme.io,software,50,US,2023-01-01,1,250000\n",
    )
    .expect("companies");
    fs::write(
        dir.join("contacts.json"),
        r#"[
  {"id": "c1", "email": "Jane@Acme.io", "first_name": "Jane", "last_name": "Doe",
   "title": "vp sales", "company_id": "co1", "phone": "1 (555) 010-2030", "status": "active"},
  {"id": "c2", "email": " jane@acme.io", "first_name": "Jane", "last_name": "Doe",
   "title": "VP Sales", "company_id": "co1", "phone": null, "status": "active"}
]"#,
    )
    .expect("contacts");
    fs::write(
        dir.join("opportunities.csv"),
        "id,name,contact_id,company_id,amount,stage,product,probability,created_date,close_date,is_closed,forecast_category\n\
         o1,Renewal,c2,co1,1200,Proposal,Core,0.5,2024-01-10,2024-03-01,0,Pipeline\n",
    )
    .expect("opportunities");
    fs::write(
        dir.join("activities.json"),
        r#"{"id": "a1", "contact_id": "c2", "opportunity_id": "o1", "type": "call",
  "subject": "Kickoff", "timestamp": "2024-01-11T09:30:00Z", "duration_minutes": 30}"#,
    )
    .expect("activities");
}

async fn open(dir: &Path) -> SqlitePool {
    SqlitePool::connect_with(SqliteConnectOptions::new().filename(dir.join("crm.db")))
        .await
        .expect("open db")
}

#[tokio::test]
async fn duplicate_contact_collapses_and_references_follow() {
    let dir = tempdir().expect("tempdir");
    write_inputs(dir.path());
    let config = write_config(dir.path(), "contacts.json");

    let summary = run_once_from_config(&config).await.expect("run");
    assert_eq!(summary.extracted.contacts, 2);
    assert_eq!(summary.persisted.companies, 1);
    assert_eq!(summary.persisted.contacts, 1);
    assert_eq!(summary.persisted.opportunities, 1);
    assert_eq!(summary.persisted.activities, 1);
    assert_eq!(summary.dropped_rows, 1);
    assert_eq!(summary.remapped_contact_ids, 2);

    let pool = open(dir.path()).await;
    let contacts: Vec<(String, String, Option<String>)> =
        sqlx::query_as("SELECT id, email, phone FROM Contacts")
            .fetch_all(&pool)
            .await
            .expect("contacts");
    assert_eq!(
        contacts,
        vec![("c1".to_string(), "jane@acme.io".to_string(), Some("+1 (555) 010-2030".to_string()))]
    );

    let opp_contact: String = sqlx::query_scalar("SELECT contact_id FROM Opportunities WHERE id = 'o1'")
        .fetch_one(&pool)
        .await
        .expect("opportunity");
    assert_eq!(opp_contact, "c1");
    let probability: i64 = sqlx::query_scalar("SELECT probability FROM Opportunities WHERE id = 'o1'")
        .fetch_one(&pool)
        .await
        .expect("probability");
    assert_eq!(probability, 0, "fractional integers round down");

    let (activity_contact, timestamp): (String, String) =
        sqlx::query_as("SELECT contact_id, timestamp FROM Activities")
            .fetch_one(&pool)
            .await
            .expect("activity");
    assert_eq!(activity_contact, "c1");
    assert_eq!(timestamp, "2024-01-11 09:30:00");

    let company: (String, String) = sqlx::query_as("SELECT name, industry FROM Companies")
        .fetch_one(&pool)
        .await
        .expect("company");
    assert_eq!(company, ("Acme Corp".to_string(), "Software".to_string()));
    pool.close().await;
}

#[tokio::test]
async fn rerun_replaces_previous_contents() {
    let dir = tempdir().expect("tempdir");
    write_inputs(dir.path());
    let config = write_config(dir.path(), "contacts.json");

    run_once_from_config(&config).await.expect("first run");
    let second = run_once_from_config(&config).await.expect("second run");
    assert_eq!(second.persisted.total(), 4);

    let pool = open(dir.path()).await;
    let contacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Contacts")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(contacts, 1);
    pool.close().await;
}

#[tokio::test]
async fn records_without_names_are_persisted() {
    let dir = tempdir().expect("tempdir");
    write_inputs(dir.path());
    fs::write(
        dir.path().join("contacts.csv"),
        "id,email,first_name,last_name,title,company_id,phone,status,created_date,last_modified\n\
         c1,a@b.com,,Doe,analyst,co1,,active,2023-01-01,2023-01-01\n",
    )
    .expect("contacts");
    fs::write(
        dir.path().join("opportunities.csv"),
        "id,name,contact_id,company_id,amount,created_date,close_date\n\
         o1,,c1,co1,1200,2024-01-10,2024-03-01\n",
    )
    .expect("opportunities");
    let config = write_config(dir.path(), "contacts.csv");

    let summary = run_once_from_config(&config).await.expect("run");
    assert_eq!(summary.persisted.contacts, 1);
    assert_eq!(summary.persisted.opportunities, 1);

    let pool = open(dir.path()).await;
    let (first_name, last_name): (Option<String>, String) =
        sqlx::query_as("SELECT first_name, last_name FROM Contacts WHERE id = 'c1'")
            .fetch_one(&pool)
            .await
            .expect("contact");
    assert_eq!(first_name, None);
    assert_eq!(last_name, "Doe");
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM Opportunities")
        .fetch_one(&pool)
        .await
        .expect("opportunity");
    assert_eq!(name, None);
    pool.close().await;
}

#[tokio::test]
async fn missing_input_fails_the_extract_stage() {
    let dir = tempdir().expect("tempdir");
    write_inputs(dir.path());
    let config = write_config(dir.path(), "missing.json");

    let err = run_once_from_config(&config).await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Extract(TableKind::Contacts)));
    assert!(!dir.path().join("crm.db").exists());
}

#[tokio::test]
async fn unreadable_config_is_a_config_error() {
    let dir = tempdir().expect("tempdir");
    let err = run_once_from_config(dir.path().join("nope.yml")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}
