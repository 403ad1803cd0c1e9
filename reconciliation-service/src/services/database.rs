//! PostgreSQL store for the reconciliation engine.

use crate::models::{
    BankTransaction, CompanyExpense, MatchDecision, Receipt, ReconcileMode, RunRecord,
};
use crate::repository::{ApplyOutcome, CandidateRepository, DecisionApplier, ReconciliationStore};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "reconciliation-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CandidateRepository for Database {
    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn unmatched_debit_transactions(
        &self,
        company_id: Uuid,
        statement_id: Option<Uuid>,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unmatched_debit_transactions"])
            .start_timer();

        // Date-ascending order (ids as tiebreak) keeps reruns over unchanged
        // data deterministic; the matcher relies on this.
        let transactions = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT transaction_id, company_id, statement_id, transaction_date, description,
                   transaction_type, check_number, amount, status, matched_counterpart_id,
                   match_note, created_utc
            FROM bank_transactions
            WHERE company_id = $1
              AND status = 'unmatched'
              AND amount < 0
              AND ($2::uuid IS NULL OR statement_id = $2)
            ORDER BY transaction_date ASC NULLS LAST, transaction_id ASC
            "#,
        )
        .bind(company_id)
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn unmatched_receipts(&self, company_id: Uuid) -> Result<Vec<Receipt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unmatched_receipts"])
            .start_timer();

        let receipts = sqlx::query_as::<_, Receipt>(
            r#"
            SELECT receipt_id, company_id, vendor, amount, receipt_date,
                   matched_transaction_id, created_utc
            FROM receipts
            WHERE company_id = $1 AND matched_transaction_id IS NULL
            ORDER BY receipt_date ASC NULLS LAST, receipt_id ASC
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch receipts: {}", e)))?;

        timer.observe_duration();

        Ok(receipts)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn active_expenses(&self, company_id: Uuid) -> Result<Vec<CompanyExpense>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_expenses"])
            .start_timer();

        let expenses = sqlx::query_as::<_, CompanyExpense>(
            r#"
            SELECT expense_id, company_id, name, amount, start_date, is_active, created_utc
            FROM company_expenses
            WHERE company_id = $1 AND is_active = TRUE
            ORDER BY name ASC, expense_id ASC
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch expenses: {}", e)))?;

        timer.observe_duration();

        Ok(expenses)
    }
}

#[async_trait]
impl DecisionApplier for Database {
    #[instrument(
        skip(self, decision),
        fields(
            company_id = %company_id,
            transaction_id = %decision.transaction_id,
            counterpart_id = %decision.counterpart_id,
        )
    )]
    async fn apply_match(
        &self,
        company_id: Uuid,
        decision: &MatchDecision,
        mode: ReconcileMode,
    ) -> Result<ApplyOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_match"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Conditional write: only an unmatched row can be claimed, so a retry
        // or a losing concurrent run affects zero rows instead of overwriting.
        let updated = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET status = $3, matched_counterpart_id = $4, match_note = $5
            WHERE company_id = $1 AND transaction_id = $2 AND status = 'unmatched'
            "#,
        )
        .bind(company_id)
        .bind(decision.transaction_id)
        .bind(decision.confidence.status().as_str())
        .bind(decision.counterpart_id)
        .bind(&decision.explanation)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update transaction: {}", e))
        })?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(ApplyOutcome::StaleConflict);
        }

        if mode == ReconcileMode::Receipts {
            let claimed = sqlx::query(
                r#"
                UPDATE receipts
                SET matched_transaction_id = $3
                WHERE company_id = $1 AND receipt_id = $2 AND matched_transaction_id IS NULL
                "#,
            )
            .bind(company_id)
            .bind(decision.counterpart_id)
            .bind(decision.transaction_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to claim receipt: {}", e))
            })?
            .rows_affected();

            if claimed == 0 {
                tx.rollback().await.ok();
                timer.observe_duration();
                return Ok(ApplyOutcome::StaleConflict);
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit match: {}", e))
        })?;

        timer.observe_duration();

        Ok(ApplyOutcome::Applied)
    }
}

#[async_trait]
impl ReconciliationStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, record), fields(company_id = %record.company_id, run_id = %record.run_id))]
    async fn record_run(&self, record: &RunRecord) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_run"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO reconciliation_runs (run_id, company_id, statement_id, mode,
                total_candidates, matched_count, discrepancy_count, unmatched_count,
                started_utc, completed_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.run_id)
        .bind(record.company_id)
        .bind(record.statement_id)
        .bind(&record.mode)
        .bind(record.total_candidates)
        .bind(record.matched_count)
        .bind(record.discrepancy_count)
        .bind(record.unmatched_count)
        .bind(record.started_utc)
        .bind(record.completed_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record run: {}", e)))?;

        timer.observe_duration();
        info!(run_id = %record.run_id, "Reconcile run recorded");

        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_runs(
        &self,
        company_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<RunRecord>, Option<Uuid>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_runs"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let runs = if let Some(cursor) = page_token {
            sqlx::query_as::<_, RunRecord>(
                r#"
                SELECT run_id, company_id, statement_id, mode, total_candidates, matched_count,
                       discrepancy_count, unmatched_count, started_utc, completed_utc
                FROM reconciliation_runs
                WHERE company_id = $1 AND run_id > $2
                ORDER BY run_id
                LIMIT $3
                "#,
            )
            .bind(company_id)
            .bind(cursor)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, RunRecord>(
                r#"
                SELECT run_id, company_id, statement_id, mode, total_candidates, matched_count,
                       discrepancy_count, unmatched_count, started_utc, completed_utc
                FROM reconciliation_runs
                WHERE company_id = $1
                ORDER BY run_id
                LIMIT $2
                "#,
            )
            .bind(company_id)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list runs: {}", e)))?;

        timer.observe_duration();

        let has_more = runs.len() > limit as usize;
        let mut runs = runs;
        if has_more {
            runs.pop();
        }
        let next_token = if has_more {
            runs.last().map(|r| r.run_id)
        } else {
            None
        };

        Ok((runs, next_token))
    }
}
