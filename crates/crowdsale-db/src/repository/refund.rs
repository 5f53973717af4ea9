//! # Refund Repository
//!
//! Append-only journal of refunds paid after a failed sale.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crowdsale_core::{Address, FundsAmount, RefundRecord};

use super::parse_column;
use crate::error::{DbError, DbResult};

/// Repository for refund records.
#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    /// Creates a new RefundRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    pub async fn insert(&self, refund: &RefundRecord) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_with(&mut conn, refund).await
    }

    /// Appends a refund on an existing connection or transaction.
    pub async fn insert_with(conn: &mut SqliteConnection, refund: &RefundRecord) -> DbResult<()> {
        debug!(payer = %refund.payer, amount = %refund.amount, "Journaling refund");

        sqlx::query("INSERT INTO refunds (payer, amount, refunded_at) VALUES (?1, ?2, ?3)")
            .bind(refund.payer.to_string())
            .bind(refund.amount.to_string())
            .bind(refund.refunded_at)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Lists refunds paid to `payer`, oldest first.
    pub async fn list_by_payer(&self, payer: &Address) -> DbResult<Vec<RefundRecord>> {
        let rows = sqlx::query(
            "SELECT payer, amount, refunded_at FROM refunds WHERE payer = ?1 ORDER BY id",
        )
        .bind(payer.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(refund_from_row).collect()
    }

    /// Lists every refund, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<RefundRecord>> {
        let rows = sqlx::query("SELECT payer, amount, refunded_at FROM refunds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(refund_from_row).collect()
    }

    /// Sums every refund paid.
    pub async fn total_refunded(&self) -> DbResult<FundsAmount> {
        let amounts: Vec<String> = sqlx::query_scalar("SELECT amount FROM refunds")
            .fetch_all(&self.pool)
            .await?;

        amounts.iter().try_fold(FundsAmount::ZERO, |total, text| {
            let amount: FundsAmount = text
                .parse()
                .map_err(|e| DbError::invalid_data("amount", e))?;
            total
                .checked_add(amount)
                .map_err(|e| DbError::invalid_data("amount", e))
        })
    }
}

fn refund_from_row(row: &SqliteRow) -> DbResult<RefundRecord> {
    let refunded_at: DateTime<Utc> = row.try_get("refunded_at")?;
    Ok(RefundRecord {
        payer: parse_column(row, "payer")?,
        amount: parse_column(row, "amount")?,
        refunded_at,
    })
}
