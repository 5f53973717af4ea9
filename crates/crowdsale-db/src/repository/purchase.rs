//! # Purchase Repository
//!
//! Append-only journal of committed purchases.
//!
//! The journal doubles as an audit trail: summing `tokens_allocated` and
//! `net_payment` must reproduce the snapshot's tokens sold and raised total.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crowdsale_core::{Address, FundsAmount, PurchaseRecord, TokenAmount};

use super::parse_column;
use crate::error::{DbError, DbResult};

const SELECT_PURCHASES: &str = r#"
    SELECT
        id, payer, beneficiary, payment_amount, net_payment,
        tokens_allocated, refund_amount, purchased_at
    FROM purchases
"#;

/// Repository for purchase records.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Appends a purchase record.
    pub async fn insert(&self, record: &PurchaseRecord) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_with(&mut conn, record).await
    }

    /// Appends a purchase record on an existing connection or transaction.
    pub async fn insert_with(conn: &mut SqliteConnection, record: &PurchaseRecord) -> DbResult<()> {
        debug!(id = %record.id, beneficiary = %record.beneficiary, "Journaling purchase");

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, payer, beneficiary, payment_amount, net_payment,
                tokens_allocated, refund_amount, purchased_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.payer.to_string())
        .bind(record.beneficiary.to_string())
        .bind(record.payment_amount.to_string())
        .bind(record.net_payment.to_string())
        .bind(record.tokens_allocated.to_string())
        .bind(record.refund_amount.to_string())
        .bind(record.purchased_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets a purchase by id.
    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<PurchaseRecord>> {
        let sql = format!("{} WHERE id = ?1", SELECT_PURCHASES);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(purchase_from_row).transpose()
    }

    /// Lists the purchases made for `beneficiary`, oldest first.
    pub async fn list_by_beneficiary(&self, beneficiary: &Address) -> DbResult<Vec<PurchaseRecord>> {
        let sql = format!(
            "{} WHERE beneficiary = ?1 ORDER BY purchased_at, rowid",
            SELECT_PURCHASES
        );
        let rows = sqlx::query(&sql)
            .bind(beneficiary.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(purchase_from_row).collect()
    }

    /// Lists every purchase, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<PurchaseRecord>> {
        let sql = format!("{} ORDER BY purchased_at, rowid", SELECT_PURCHASES);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(purchase_from_row).collect()
    }

    /// Counts journaled purchases.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Sums tokens allocated across all purchases.
    ///
    /// Summed in Rust: the amounts exceed SQLite's 64-bit integers.
    pub async fn total_tokens(&self) -> DbResult<TokenAmount> {
        let amounts: Vec<String> = sqlx::query_scalar("SELECT tokens_allocated FROM purchases")
            .fetch_all(&self.pool)
            .await?;

        amounts.iter().try_fold(TokenAmount::ZERO, |total, text| {
            let amount: TokenAmount = text
                .parse()
                .map_err(|e| DbError::invalid_data("tokens_allocated", e))?;
            total
                .checked_add(amount)
                .map_err(|e| DbError::invalid_data("tokens_allocated", e))
        })
    }

    /// Sums net payments across all purchases.
    pub async fn total_net_payment(&self) -> DbResult<FundsAmount> {
        let amounts: Vec<String> = sqlx::query_scalar("SELECT net_payment FROM purchases")
            .fetch_all(&self.pool)
            .await?;

        amounts.iter().try_fold(FundsAmount::ZERO, |total, text| {
            let amount: FundsAmount = text
                .parse()
                .map_err(|e| DbError::invalid_data("net_payment", e))?;
            total
                .checked_add(amount)
                .map_err(|e| DbError::invalid_data("net_payment", e))
        })
    }
}

fn purchase_from_row(row: &SqliteRow) -> DbResult<PurchaseRecord> {
    let purchased_at: DateTime<Utc> = row.try_get("purchased_at")?;

    Ok(PurchaseRecord {
        id: parse_column(row, "id")?,
        payer: parse_column(row, "payer")?,
        beneficiary: parse_column(row, "beneficiary")?,
        payment_amount: parse_column(row, "payment_amount")?,
        net_payment: parse_column(row, "net_payment")?,
        tokens_allocated: parse_column(row, "tokens_allocated")?,
        refund_amount: parse_column(row, "refund_amount")?,
        purchased_at,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{Duration, TimeZone};

    fn record(beneficiary: u8, tokens: u128, net: u128, minute: i64) -> PurchaseRecord {
        let base = Utc.with_ymd_and_hms(2026, 5, 2, 9, 0, 0).unwrap();
        PurchaseRecord {
            id: Uuid::new_v4(),
            payer: Address::repeat_byte(0x10),
            beneficiary: Address::repeat_byte(beneficiary),
            payment_amount: FundsAmount::new(net + 3),
            net_payment: FundsAmount::new(net),
            tokens_allocated: TokenAmount::new(tokens),
            refund_amount: FundsAmount::new(3),
            purchased_at: base + Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.purchases();
        let purchase = record(1, 100, 1_000, 0);

        repo.insert(&purchase).await.unwrap();

        assert_eq!(repo.get_by_id(purchase.id).await.unwrap(), Some(purchase));
        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.purchases();
        let purchase = record(1, 100, 1_000, 0);

        repo.insert(&purchase).await.unwrap();
        assert!(matches!(
            repo.insert(&purchase).await,
            Err(DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_by_beneficiary_in_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.purchases();

        let later = record(1, 5, 50, 10);
        let earlier = record(1, 7, 70, 1);
        let other = record(2, 9, 90, 5);
        for purchase in [&later, &earlier, &other] {
            repo.insert(purchase).await.unwrap();
        }

        let listed = repo
            .list_by_beneficiary(&Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(listed, vec![earlier, later]);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_totals_beyond_i64() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.purchases();
        let big = 300_000_000u128 * 10u128.pow(18);

        repo.insert(&record(1, big, 10, 0)).await.unwrap();
        repo.insert(&record(2, 1, 20, 1)).await.unwrap();

        assert_eq!(repo.total_tokens().await.unwrap(), TokenAmount::new(big + 1));
        assert_eq!(repo.total_net_payment().await.unwrap(), FundsAmount::new(30));
    }
}
