//! Common test utilities for reconciliation-service integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use reconciliation_service::config::{DatabaseConfig, ReconcileConfig, ReconciliationConfig};
use reconciliation_service::models::{BankTransaction, CompanyExpense, Receipt};
use reconciliation_service::repository::InMemoryStore;
use reconciliation_service::startup::Application;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,reconciliation_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> ReconciliationConfig {
    ReconciliationConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "reconciliation-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            // The in-memory store backs the tests; no pool is ever opened.
            url: "postgres://unused".to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        reconcile: ReconcileConfig {
            apply_concurrency: 4,
            run_deadline_secs: None,
        },
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryStore>,
    pub company_id: Uuid,
}

impl TestApp {
    /// POST /reconcile for this app's company.
    pub async fn reconcile(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/reconcile", self.address))
            .header("X-Company-Id", self.company_id.to_string())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute reconcile request")
    }
}

/// Spawn a test application over the in-memory store and return its handle.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(InMemoryStore::new());
    let app = Application::with_store(test_config(), store.clone())
        .await
        .expect("Failed to build application");

    let address = format!("http://127.0.0.1:{}", app.port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        store,
        company_id: Uuid::new_v4(),
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn amount(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// An unmatched debit transaction for the given company.
pub fn debit(company_id: Uuid, on: &str, amt: &str) -> BankTransaction {
    BankTransaction {
        transaction_id: Uuid::new_v4(),
        company_id,
        statement_id: None,
        transaction_date: Some(date(on)),
        description: "CARD PURCHASE".to_string(),
        transaction_type: "debit".to_string(),
        check_number: None,
        amount: amount(amt),
        status: "unmatched".to_string(),
        matched_counterpart_id: None,
        match_note: None,
        created_utc: Utc::now(),
    }
}

/// An unmatched debit transaction belonging to one statement.
pub fn statement_debit(
    company_id: Uuid,
    statement_id: Uuid,
    on: &str,
    amt: &str,
) -> BankTransaction {
    let mut txn = debit(company_id, on, amt);
    txn.statement_id = Some(statement_id);
    txn
}

/// An unmatched receipt for the given company.
pub fn receipt(company_id: Uuid, vendor: &str, on: &str, amt: &str) -> Receipt {
    Receipt {
        receipt_id: Uuid::new_v4(),
        company_id,
        vendor: vendor.to_string(),
        amount: Some(amount(amt)),
        receipt_date: Some(date(on)),
        matched_transaction_id: None,
        created_utc: Utc::now(),
    }
}

/// An active scheduled expense for the given company.
pub fn expense(company_id: Uuid, name: &str, starts: &str, amt: &str) -> CompanyExpense {
    CompanyExpense {
        expense_id: Uuid::new_v4(),
        company_id,
        name: name.to_string(),
        amount: amount(amt),
        start_date: Some(date(starts)),
        is_active: true,
        created_utc: Utc::now(),
    }
}
