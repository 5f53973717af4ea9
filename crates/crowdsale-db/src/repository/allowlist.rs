//! # Allow-List Repository
//!
//! Durable allow-list decisions, one row per address.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crowdsale_core::Address;

use super::parse_column;
use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct AllowListRepository {
    pool: SqlitePool,
}

impl AllowListRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AllowListRepository { pool }
    }

    pub async fn set(&self, addresses: &[Address], listed: bool) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::set_with(&mut conn, addresses, listed).await
    }

    /// Records `listed` for every address on an existing connection or transaction.
    pub async fn set_with(
        conn: &mut SqliteConnection,
        addresses: &[Address],
        listed: bool,
    ) -> DbResult<()> {
        debug!(count = addresses.len(), listed, "Recording allow-list change");

        let now = Utc::now();
        for address in addresses {
            sqlx::query(
                r#"
                INSERT INTO allow_list (address, listed, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (address) DO UPDATE SET
                    listed = excluded.listed,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(address.to_string())
            .bind(listed)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Every recorded decision as `(address, listed)`.
    pub async fn list(&self) -> DbResult<Vec<(Address, bool)>> {
        let rows = sqlx::query("SELECT address, listed FROM allow_list ORDER BY address")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decision_from_row).collect()
    }

    /// The recorded decision for `address`, if any.
    pub async fn decision(&self, address: &Address) -> DbResult<Option<bool>> {
        let listed: Option<bool> =
            sqlx::query_scalar("SELECT listed FROM allow_list WHERE address = ?1")
                .bind(address.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(listed)
    }
}

fn decision_from_row(row: &SqliteRow) -> DbResult<(Address, bool)> {
    let listed: bool = row.try_get("listed")?;
    Ok((parse_column(row, "address")?, listed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_latest_decision_wins() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.allow_list();
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);

        repo.set(&[alice, bob], true).await.unwrap();
        repo.set(&[bob], false).await.unwrap();

        assert_eq!(repo.list().await.unwrap(), vec![(alice, true), (bob, false)]);
        assert_eq!(repo.decision(&bob).await.unwrap(), Some(false));
        assert_eq!(repo.decision(&Address::repeat_byte(3)).await.unwrap(), None);
    }
}
