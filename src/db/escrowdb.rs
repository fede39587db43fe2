// db/escrowdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;

use crate::{
    models::escrowmodels::{
        CreateEscrowOutcome, EscrowTransaction, FundingOutcome, NewEscrowTransaction, PayoutStatus,
        ProviderPayout, ServiceQuote, TransitionOutcome,
    },
    utils::currency::{apply_monthly_cap, split_gross},
};

#[async_trait]
pub trait EscrowExt: Send + Sync {
    async fn get_service_quote(&self, quote_id: Uuid) -> Result<Option<ServiceQuote>, sqlx::Error>;

    async fn get_escrow_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<EscrowTransaction>, sqlx::Error>;

    /// Insert the escrow row for a quote, settling the commission against the
    /// provider's monthly aggregate (locked for the duration) and bumping that
    /// aggregate in the same transaction. A quote that already has a row gets
    /// it back untouched.
    async fn create_escrow_transaction(
        &self,
        new: NewEscrowTransaction,
        at: DateTime<Utc>,
    ) -> Result<CreateEscrowOutcome, sqlx::Error>;

    /// `pending -> funded`
    /// `pending -> funded`. A reference already bound to another transaction
    /// is refused.
    async fn mark_escrow_funded(
        &self,
        transaction_id: Uuid,
        payment_reference: &str,
        funded_at: DateTime<Utc>,
        auto_release_at: DateTime<Utc>,
    ) -> Result<FundingOutcome, sqlx::Error>;

    /// `funded -> disputed`, clearing the auto-release deadline.
    async fn mark_escrow_disputed(
        &self,
        transaction_id: Uuid,
        disputed_by: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<EscrowTransaction>, sqlx::Error>;

    /// `funded -> released` (or `disputed -> released` when `allow_disputed`)
    /// plus exactly one pending payout.
    async fn release_escrow(
        &self,
        transaction_id: Uuid,
        allow_disputed: bool,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<(EscrowTransaction, ProviderPayout)>, sqlx::Error>;

    /// `funded|disputed -> refunded`. Returns the commission to the provider's
    /// monthly aggregate and counts a cancellation against the provider.
    async fn refund_escrow(
        &self,
        transaction_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<EscrowTransaction>, sqlx::Error>;

    async fn list_auto_release_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, sqlx::Error>;

    async fn get_payout(&self, payout_id: Uuid) -> Result<Option<ProviderPayout>, sqlx::Error>;

    async fn list_provider_payouts(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderPayout>, sqlx::Error>;

    /// `pending -> completed|failed`. `None` when missing or already settled.
    async fn settle_payout(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        external_reference: Option<String>,
        failure_reason: Option<String>,
        settled_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ProviderPayout>, sqlx::Error>;

    async fn get_monthly_commission_total(
        &self,
        provider_id: Uuid,
        period: &str,
    ) -> Result<i64, sqlx::Error>;
}

const ESCROW_COLUMNS: &str = r#"
    id, quote_id, client_id, provider_id, amount_xaf, commission_rate,
    commission_xaf, net_amount_xaf, commission_period, status, payment_reference,
    funded_at, auto_release_at, released_at, refunded_at, refund_reason,
    dispute_reason, disputed_by, disputed_at, created_at, updated_at
"#;

const PAYOUT_COLUMNS: &str = r#"
    id, transaction_id, provider_id, amount_xaf, status, external_reference,
    failure_reason, settled_by, created_at, settled_at
"#;

impl DBClient {
    async fn escrow_rejected_or_missing<T>(
        &self,
        transaction_id: Uuid,
    ) -> Result<TransitionOutcome<T>, sqlx::Error> {
        Ok(match self.get_escrow_transaction(transaction_id).await? {
            Some(current) => TransitionOutcome::Rejected(current),
            None => TransitionOutcome::NotFound,
        })
    }

    async fn escrow_holding_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM escrow_transactions WHERE payment_reference = $1",
        )
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl EscrowExt for DBClient {
    async fn get_service_quote(&self, quote_id: Uuid) -> Result<Option<ServiceQuote>, sqlx::Error> {
        sqlx::query_as::<_, ServiceQuote>(
            r#"
            SELECT id, client_id, provider_id, amount_xaf, country_code, status
            FROM service_quotes
            WHERE id = $1
            "#,
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_escrow_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<EscrowTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM escrow_transactions WHERE id = $1",
            ESCROW_COLUMNS
        );

        sqlx::query_as::<_, EscrowTransaction>(&query)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_escrow_transaction(
        &self,
        new: NewEscrowTransaction,
        at: DateTime<Utc>,
    ) -> Result<CreateEscrowOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let by_quote = format!(
            "SELECT {} FROM escrow_transactions WHERE quote_id = $1",
            ESCROW_COLUMNS
        );

        let existing = sqlx::query_as::<_, EscrowTransaction>(&by_quote)
            .bind(new.quote_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(existing) = existing {
            tx.rollback().await?;
            return Ok(CreateEscrowOutcome::Existing(existing));
        }

        sqlx::query(
            r#"
            INSERT INTO monthly_commission_totals (provider_id, period, commission_xaf)
            VALUES ($1, $2, 0)
            ON CONFLICT (provider_id, period) DO NOTHING
            "#,
        )
        .bind(new.provider_id)
        .bind(&new.commission_period)
        .execute(&mut *tx)
        .await?;

        let charged: i64 = sqlx::query_scalar(
            r#"
            SELECT commission_xaf FROM monthly_commission_totals
            WHERE provider_id = $1 AND period = $2
            FOR UPDATE
            "#,
        )
        .bind(new.provider_id)
        .bind(&new.commission_period)
        .fetch_one(&mut *tx)
        .await?;

        let commission = apply_monthly_cap(new.raw_commission_xaf, new.monthly_cap_xaf, charged);
        let (commission, net) = split_gross(new.amount_xaf, commission);

        let insert = format!(
            r#"
            INSERT INTO escrow_transactions
                (id, quote_id, client_id, provider_id, amount_xaf, commission_rate,
                 commission_xaf, net_amount_xaf, commission_period, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $10)
            ON CONFLICT (quote_id) DO NOTHING
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        );

        let created = sqlx::query_as::<_, EscrowTransaction>(&insert)
            .bind(Uuid::new_v4())
            .bind(new.quote_id)
            .bind(new.client_id)
            .bind(new.provider_id)
            .bind(new.amount_xaf)
            .bind(&new.commission_rate)
            .bind(commission)
            .bind(net)
            .bind(&new.commission_period)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

        let created = match created {
            Some(created) => created,
            None => {
                // Lost the race to a concurrent create for the same quote.
                tx.rollback().await?;
                let existing = sqlx::query_as::<_, EscrowTransaction>(&by_quote)
                    .bind(new.quote_id)
                    .fetch_one(&self.pool)
                    .await?;
                return Ok(CreateEscrowOutcome::Existing(existing));
            }
        };

        sqlx::query(
            r#"
            UPDATE monthly_commission_totals
            SET commission_xaf = commission_xaf + $3
            WHERE provider_id = $1 AND period = $2
            "#,
        )
        .bind(new.provider_id)
        .bind(&new.commission_period)
        .bind(commission)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CreateEscrowOutcome::Created(created))
    }

    async fn mark_escrow_funded(
        &self,
        transaction_id: Uuid,
        payment_reference: &str,
        funded_at: DateTime<Utc>,
        auto_release_at: DateTime<Utc>,
    ) -> Result<FundingOutcome, sqlx::Error> {
        if let Some(holder) = self.escrow_holding_reference(payment_reference).await? {
            if holder != transaction_id {
                return Ok(FundingOutcome::ReferenceInUse(holder));
            }
        }

        let query = format!(
            r#"
            UPDATE escrow_transactions
            SET status = 'funded',
                payment_reference = $2,
                funded_at = $3,
                auto_release_at = $4,
                updated_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        );

        let updated = sqlx::query_as::<_, EscrowTransaction>(&query)
            .bind(transaction_id)
            .bind(payment_reference)
            .bind(funded_at)
            .bind(auto_release_at)
            .fetch_optional(&self.pool)
            .await;

        match updated {
            Ok(Some(row)) => Ok(FundingOutcome::Transition(TransitionOutcome::Applied(row))),
            Ok(None) => Ok(FundingOutcome::Transition(
                self.escrow_rejected_or_missing(transaction_id).await?,
            )),
            // Lost a race against another funding with the same reference.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                match self.escrow_holding_reference(payment_reference).await? {
                    Some(holder) => Ok(FundingOutcome::ReferenceInUse(holder)),
                    None => Err(sqlx::Error::Database(e)),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_escrow_disputed(
        &self,
        transaction_id: Uuid,
        disputed_by: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<EscrowTransaction>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE escrow_transactions
            SET status = 'disputed',
                dispute_reason = $2,
                disputed_by = $3,
                disputed_at = $4,
                auto_release_at = NULL,
                updated_at = $4
            WHERE id = $1 AND status = 'funded'
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        );

        let updated = sqlx::query_as::<_, EscrowTransaction>(&query)
            .bind(transaction_id)
            .bind(reason)
            .bind(disputed_by)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(TransitionOutcome::Applied(row)),
            None => self.escrow_rejected_or_missing(transaction_id).await,
        }
    }

    async fn release_escrow(
        &self,
        transaction_id: Uuid,
        allow_disputed: bool,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<(EscrowTransaction, ProviderPayout)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE escrow_transactions
            SET status = 'released',
                released_at = $2,
                updated_at = $2
            WHERE id = $1 AND (status = 'funded' OR ($3 AND status = 'disputed'))
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        );

        let released = sqlx::query_as::<_, EscrowTransaction>(&query)
            .bind(transaction_id)
            .bind(at)
            .bind(allow_disputed)
            .fetch_optional(&mut *tx)
            .await?;

        let released = match released {
            Some(row) => row,
            None => {
                tx.rollback().await?;
                return self.escrow_rejected_or_missing(transaction_id).await;
            }
        };

        let insert = format!(
            r#"
            INSERT INTO provider_payouts (id, transaction_id, provider_id, amount_xaf, status, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        );

        let inserted = sqlx::query_as::<_, ProviderPayout>(&insert)
            .bind(Uuid::new_v4())
            .bind(released.id)
            .bind(released.provider_id)
            .bind(released.net_amount_xaf)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

        let payout = match inserted {
            Some(payout) => payout,
            None => {
                let existing = format!(
                    "SELECT {} FROM provider_payouts WHERE transaction_id = $1",
                    PAYOUT_COLUMNS
                );
                sqlx::query_as::<_, ProviderPayout>(&existing)
                    .bind(released.id)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;
        Ok(TransitionOutcome::Applied((released, payout)))
    }

    async fn refund_escrow(
        &self,
        transaction_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<EscrowTransaction>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE escrow_transactions
            SET status = 'refunded',
                refunded_at = $2,
                refund_reason = $3,
                auto_release_at = NULL,
                updated_at = $2
            WHERE id = $1 AND status IN ('funded', 'disputed')
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        );

        let refunded = sqlx::query_as::<_, EscrowTransaction>(&query)
            .bind(transaction_id)
            .bind(at)
            .bind(reason)
            .fetch_optional(&mut *tx)
            .await?;

        let refunded = match refunded {
            Some(row) => row,
            None => {
                tx.rollback().await?;
                return self.escrow_rejected_or_missing(transaction_id).await;
            }
        };

        sqlx::query(
            r#"
            UPDATE monthly_commission_totals
            SET commission_xaf = GREATEST(commission_xaf - $3, 0)
            WHERE provider_id = $1 AND period = $2
            "#,
        )
        .bind(refunded.provider_id)
        .bind(&refunded.commission_period)
        .bind(refunded.commission_xaf)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE verification_records
            SET cancellation_count = cancellation_count + 1,
                version = version + 1,
                updated_at = $2
            WHERE account_id = $1
            "#,
        )
        .bind(refunded.provider_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied(refunded))
    }

    async fn list_auto_release_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM escrow_transactions
            WHERE status = 'funded'
              AND auto_release_at IS NOT NULL
              AND auto_release_at <= $1
            ORDER BY auto_release_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_payout(&self, payout_id: Uuid) -> Result<Option<ProviderPayout>, sqlx::Error> {
        let query = format!("SELECT {} FROM provider_payouts WHERE id = $1", PAYOUT_COLUMNS);

        sqlx::query_as::<_, ProviderPayout>(&query)
            .bind(payout_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_provider_payouts(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<ProviderPayout>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM provider_payouts WHERE provider_id = $1 ORDER BY created_at DESC",
            PAYOUT_COLUMNS
        );

        sqlx::query_as::<_, ProviderPayout>(&query)
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn settle_payout(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        external_reference: Option<String>,
        failure_reason: Option<String>,
        settled_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<ProviderPayout>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE provider_payouts
            SET status = $2,
                external_reference = $3,
                failure_reason = $4,
                settled_by = $5,
                settled_at = $6
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        );

        sqlx::query_as::<_, ProviderPayout>(&query)
            .bind(payout_id)
            .bind(status)
            .bind(external_reference)
            .bind(failure_reason)
            .bind(settled_by)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_monthly_commission_total(
        &self,
        provider_id: Uuid,
        period: &str,
    ) -> Result<i64, sqlx::Error> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT commission_xaf FROM monthly_commission_totals
            WHERE provider_id = $1 AND period = $2
            "#,
        )
        .bind(provider_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }
}
