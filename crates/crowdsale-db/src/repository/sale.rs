//! # Sale State Repository
//!
//! Stores the latest [`SaleSnapshot`] in a single-row table.
//!
//! ```text
//! sale_state (id = 1)
//! ├── owner, token_holder          0x-hex text
//! ├── tiers                        JSON array, revalidated on load
//! ├── rate, supplies, raised, goal decimal text (u128)
//! ├── opening_time, closing_time   RFC 3339
//! └── outcome                      NULL | 'successful' | 'refunding'
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crowdsale_core::{Rate, SaleOutcome, SaleSnapshot, TierTable};

use super::parse_column;
use crate::error::{DbError, DbResult};

/// Repository for the persisted sale aggregate.
#[derive(Debug, Clone)]
pub struct SaleStateRepository {
    pool: SqlitePool,
}

impl SaleStateRepository {
    /// Creates a new SaleStateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleStateRepository { pool }
    }

    /// Writes `snapshot`, replacing any previous one.
    pub async fn save(&self, snapshot: &SaleSnapshot) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::save_with(&mut conn, snapshot).await
    }

    /// Loads the stored snapshot, if the sale was ever saved.
    pub async fn load(&self) -> DbResult<Option<SaleSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT
                owner, token_holder, tiers, rate,
                initial_supply, remaining_supply, raised_total, goal,
                opening_time, closing_time, outcome
            FROM sale_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// Checks if a snapshot has been stored.
    pub async fn exists(&self) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_state")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Upserts `snapshot` on an existing connection or transaction.
    pub async fn save_with(conn: &mut SqliteConnection, snapshot: &SaleSnapshot) -> DbResult<()> {
        debug!(
            remaining = %snapshot.remaining_supply,
            raised = %snapshot.raised_total,
            "Saving sale snapshot"
        );

        let tiers = serde_json::to_string(&snapshot.tiers)
            .map_err(|e| DbError::invalid_data("tiers", e))?;

        sqlx::query(
            r#"
            INSERT INTO sale_state (
                id, owner, token_holder, tiers, rate,
                initial_supply, remaining_supply, raised_total, goal,
                opening_time, closing_time, outcome, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (id) DO UPDATE SET
                owner = excluded.owner,
                token_holder = excluded.token_holder,
                tiers = excluded.tiers,
                rate = excluded.rate,
                initial_supply = excluded.initial_supply,
                remaining_supply = excluded.remaining_supply,
                raised_total = excluded.raised_total,
                goal = excluded.goal,
                opening_time = excluded.opening_time,
                closing_time = excluded.closing_time,
                outcome = excluded.outcome,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.owner.to_string())
        .bind(snapshot.token_holder.to_string())
        .bind(tiers)
        .bind(snapshot.rate.get().to_string())
        .bind(snapshot.initial_supply.to_string())
        .bind(snapshot.remaining_supply.to_string())
        .bind(snapshot.raised_total.to_string())
        .bind(snapshot.goal.to_string())
        .bind(snapshot.opening_time)
        .bind(snapshot.closing_time)
        .bind(snapshot.outcome.map(|o| o.to_string()))
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn snapshot_from_row(row: &SqliteRow) -> DbResult<SaleSnapshot> {
    let tiers_json: String = row.try_get("tiers")?;
    let tiers: TierTable =
        serde_json::from_str(&tiers_json).map_err(|e| DbError::invalid_data("tiers", e))?;

    let outcome: Option<String> = row.try_get("outcome")?;
    let outcome = outcome
        .map(|text| text.parse::<SaleOutcome>())
        .transpose()
        .map_err(|e| DbError::invalid_data("outcome", e))?;

    let opening_time: DateTime<Utc> = row.try_get("opening_time")?;
    let closing_time: DateTime<Utc> = row.try_get("closing_time")?;

    Ok(SaleSnapshot {
        owner: parse_column(row, "owner")?,
        token_holder: parse_column(row, "token_holder")?,
        tiers,
        rate: Rate::new(parse_column(row, "rate")?),
        initial_supply: parse_column(row, "initial_supply")?,
        remaining_supply: parse_column(row, "remaining_supply")?,
        raised_total: parse_column(row, "raised_total")?,
        goal: parse_column(row, "goal")?,
        opening_time,
        closing_time,
        outcome,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
