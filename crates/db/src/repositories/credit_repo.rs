//! Repository for the credit ledger (`credit_accounts` + `credit_refunds`).
//!
//! Debit and refund are both single-shot conditional writes: the balance
//! check rides on the UPDATE's WHERE clause, and refund idempotence rides
//! on the `credit_refunds` primary key. No read-modify-write races.

use lumen_core::types::DbId;
use sqlx::PgPool;

/// Provides debit/refund operations against user credit balances.
pub struct CreditRepo;

impl CreditRepo {
    /// Current balance for a user. Absent account reads as zero.
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<i32, sqlx::Error> {
        let balance: Option<i32> =
            sqlx::query_scalar("SELECT balance FROM credit_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    /// Debit `amount` credits if the balance covers it.
    ///
    /// Returns `false` (and leaves the balance untouched) when the user
    /// has insufficient credits. Takes any executor so intake can debit
    /// and insert the job in one transaction.
    pub async fn debit<'e, E>(executor: E, user_id: DbId, amount: i32) -> Result<bool, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE credit_accounts \
             SET balance = balance - $2, updated_at = NOW() \
             WHERE user_id = $1 AND balance >= $2",
        )
        .bind(user_id)
        .bind(amount)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Credit back the originally charged amount for a failed generation.
    ///
    /// Idempotent per generation: the refund marker row is keyed by
    /// `generation_id`, so a second call is a no-op. Returns whether this
    /// call issued the refund.
    pub async fn refund(
        pool: &PgPool,
        generation_id: DbId,
        user_id: DbId,
        amount: i32,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let marker = sqlx::query(
            "INSERT INTO credit_refunds (generation_id, user_id, amount) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (generation_id) DO NOTHING",
        )
        .bind(generation_id)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if marker.rows_affected() == 0 {
            // Already refunded by an earlier delivery of the failure signal.
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO credit_accounts (user_id, balance) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE \
             SET balance = credit_accounts.balance + $2, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
