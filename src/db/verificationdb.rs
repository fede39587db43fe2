// db/verificationdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;

use crate::models::verificationmodels::{
    DocumentStatus, NewVerificationDocument, VerificationDocument, VerificationRecord,
};

#[async_trait]
pub trait VerificationExt: Send + Sync {
    async fn get_verification_record(
        &self,
        account_id: Uuid,
    ) -> Result<Option<VerificationRecord>, sqlx::Error>;

    /// Insert `record` unless the account already has one; returns whichever
    /// row is stored afterwards.
    async fn create_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<VerificationRecord, sqlx::Error>;

    /// Write `record` if the stored version still equals `record.version`.
    /// Returns the saved row (version bumped) or `None` on a version mismatch.
    async fn save_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<Option<VerificationRecord>, sqlx::Error>;

    /// Version-checked record save and document insert in one transaction.
    async fn save_record_with_document(
        &self,
        record: &VerificationRecord,
        document: NewVerificationDocument,
    ) -> Result<Option<(VerificationRecord, VerificationDocument)>, sqlx::Error>;

    /// Version-checked record save that also rejects every pending document
    /// of `level`, in one transaction. Returns the saved row and the number of
    /// documents closed, or `None` on a version mismatch.
    async fn save_record_rejecting_level(
        &self,
        record: &VerificationRecord,
        level: i16,
        reviewed_by: Uuid,
        review_notes: &str,
    ) -> Result<Option<(VerificationRecord, u64)>, sqlx::Error>;

    async fn get_verification_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<VerificationDocument>, sqlx::Error>;

    async fn get_account_documents(
        &self,
        account_id: Uuid,
        level: Option<i16>,
    ) -> Result<Vec<VerificationDocument>, sqlx::Error>;

    /// Move a pending document to a terminal status. Returns `None` when the
    /// document is missing or no longer pending.
    async fn close_verification_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        reviewed_by: Option<Uuid>,
        review_notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<VerificationDocument>, sqlx::Error>;

    async fn content_hash_seen_elsewhere(
        &self,
        content_hash: &str,
        account_id: Uuid,
    ) -> Result<bool, sqlx::Error>;

    async fn list_stale_pending_documents(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VerificationDocument>, sqlx::Error>;
}

const RECORD_COLUMNS: &str = r#"
    account_id, account_kind, current_level,
    level_1_status, level_2_status, level_3_status, level_4_status,
    level_1_eligible_at, level_2_eligible_at, level_3_eligible_at, level_4_eligible_at,
    trust_score, is_suspended, suspension_reason, suspended_at, suspension_lifted_at,
    positive_reviews_count, negative_reviews_count, reports_count,
    response_rate, cancellation_count, version, created_at, updated_at
"#;

const DOCUMENT_COLUMNS: &str = r#"
    id, account_id, document_type, verification_level, status, file_url,
    content_hash, face_match_score, duplicate_detected, reviewed_by,
    review_notes, decided_at, created_at, updated_at
"#;

async fn update_record_row<'e, E>(
    executor: E,
    record: &VerificationRecord,
) -> Result<Option<VerificationRecord>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = format!(
        r#"
        UPDATE verification_records
        SET account_kind = $2,
            current_level = $3,
            level_1_status = $4, level_2_status = $5, level_3_status = $6, level_4_status = $7,
            level_1_eligible_at = $8, level_2_eligible_at = $9,
            level_3_eligible_at = $10, level_4_eligible_at = $11,
            trust_score = $12,
            is_suspended = $13,
            suspension_reason = $14,
            suspended_at = $15,
            suspension_lifted_at = $16,
            positive_reviews_count = $17,
            negative_reviews_count = $18,
            reports_count = $19,
            response_rate = $20,
            cancellation_count = $21,
            version = version + 1,
            updated_at = $22
        WHERE account_id = $1 AND version = $23
        RETURNING {}
        "#,
        RECORD_COLUMNS
    );

    sqlx::query_as::<_, VerificationRecord>(&query)
        .bind(record.account_id)
        .bind(record.account_kind)
        .bind(record.current_level)
        .bind(record.levels[0].status)
        .bind(record.levels[1].status)
        .bind(record.levels[2].status)
        .bind(record.levels[3].status)
        .bind(record.levels[0].eligible_at.to_column())
        .bind(record.levels[1].eligible_at.to_column())
        .bind(record.levels[2].eligible_at.to_column())
        .bind(record.levels[3].eligible_at.to_column())
        .bind(record.trust_score)
        .bind(record.is_suspended)
        .bind(&record.suspension_reason)
        .bind(record.suspended_at)
        .bind(record.suspension_lifted_at)
        .bind(record.positive_reviews_count)
        .bind(record.negative_reviews_count)
        .bind(record.reports_count)
        .bind(record.response_rate)
        .bind(record.cancellation_count)
        .bind(record.updated_at)
        .bind(record.version)
        .fetch_optional(executor)
        .await
}

#[async_trait]
impl VerificationExt for DBClient {
    async fn get_verification_record(
        &self,
        account_id: Uuid,
    ) -> Result<Option<VerificationRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM verification_records WHERE account_id = $1",
            RECORD_COLUMNS
        );

        sqlx::query_as::<_, VerificationRecord>(&query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<VerificationRecord, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO verification_records
                (account_id, account_kind, current_level, level_1_eligible_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(record.account_id)
        .bind(record.account_kind)
        .bind(record.current_level)
        .bind(record.levels[0].eligible_at.to_column())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        self.get_verification_record(record.account_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn save_verification_record(
        &self,
        record: &VerificationRecord,
    ) -> Result<Option<VerificationRecord>, sqlx::Error> {
        update_record_row(&self.pool, record).await
    }

    async fn save_record_with_document(
        &self,
        record: &VerificationRecord,
        document: NewVerificationDocument,
    ) -> Result<Option<(VerificationRecord, VerificationDocument)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let saved = match update_record_row(&mut *tx, record).await? {
            Some(saved) => saved,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        let query = format!(
            r#"
            INSERT INTO verification_documents
                (id, account_id, document_type, verification_level, status, file_url,
                 content_hash, face_match_score, duplicate_detected, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );

        let inserted = sqlx::query_as::<_, VerificationDocument>(&query)
            .bind(Uuid::new_v4())
            .bind(document.account_id)
            .bind(document.document_type)
            .bind(document.verification_level)
            .bind(&document.file_url)
            .bind(&document.content_hash)
            .bind(document.face_match_score)
            .bind(document.duplicate_detected)
            .bind(record.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some((saved, inserted)))
    }

    async fn save_record_rejecting_level(
        &self,
        record: &VerificationRecord,
        level: i16,
        reviewed_by: Uuid,
        review_notes: &str,
    ) -> Result<Option<(VerificationRecord, u64)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let saved = match update_record_row(&mut *tx, record).await? {
            Some(saved) => saved,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        let closed = sqlx::query(
            r#"
            UPDATE verification_documents
            SET status = 'rejected',
                reviewed_by = $3,
                review_notes = $4,
                decided_at = $5,
                updated_at = $5
            WHERE account_id = $1 AND verification_level = $2 AND status = 'pending'
            "#,
        )
        .bind(record.account_id)
        .bind(level)
        .bind(reviewed_by)
        .bind(review_notes)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(Some((saved, closed)))
    }

    async fn get_verification_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<VerificationDocument>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM verification_documents WHERE id = $1",
            DOCUMENT_COLUMNS
        );

        sqlx::query_as::<_, VerificationDocument>(&query)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_account_documents(
        &self,
        account_id: Uuid,
        level: Option<i16>,
    ) -> Result<Vec<VerificationDocument>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {} FROM verification_documents
            WHERE account_id = $1
              AND ($2::SMALLINT IS NULL OR verification_level = $2)
            ORDER BY created_at DESC
            "#,
            DOCUMENT_COLUMNS
        );

        sqlx::query_as::<_, VerificationDocument>(&query)
            .bind(account_id)
            .bind(level)
            .fetch_all(&self.pool)
            .await
    }

    async fn close_verification_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        reviewed_by: Option<Uuid>,
        review_notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<VerificationDocument>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE verification_documents
            SET status = $2,
                reviewed_by = $3,
                review_notes = $4,
                decided_at = $5,
                updated_at = $5
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );

        sqlx::query_as::<_, VerificationDocument>(&query)
            .bind(document_id)
            .bind(status)
            .bind(reviewed_by)
            .bind(review_notes)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
    }

    async fn content_hash_seen_elsewhere(
        &self,
        content_hash: &str,
        account_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let seen: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM verification_documents
                WHERE content_hash = $1 AND account_id <> $2
            )
            "#,
        )
        .bind(content_hash)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(seen)
    }

    async fn list_stale_pending_documents(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VerificationDocument>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {} FROM verification_documents
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            DOCUMENT_COLUMNS
        );

        sqlx::query_as::<_, VerificationDocument>(&query)
            .bind(created_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }
}
