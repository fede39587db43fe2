// db/reputationdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;

use crate::models::reputationmodels::{
    Badge, NewVote, Report, ReportStatus, ReputationStats, ReputationVote, VoteOutcome,
    VoteScoring, VoteType,
};

#[async_trait]
pub trait ReputationExt: Send + Sync {
    /// Upsert a vote keyed by (voter, target, context) and fold the change
    /// into the target's stats and badges in the same transaction.
    async fn record_vote(
        &self,
        vote: NewVote,
        scoring: &VoteScoring,
        at: DateTime<Utc>,
    ) -> Result<VoteOutcome, sqlx::Error>;

    async fn get_reputation_stats(
        &self,
        account_id: Uuid,
    ) -> Result<Option<ReputationStats>, sqlx::Error>;

    async fn get_badges(&self, account_id: Uuid) -> Result<Vec<Badge>, sqlx::Error>;

    async fn count_votes_cast_since(
        &self,
        voter_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>;

    async fn create_report(
        &self,
        target_user_id: Uuid,
        reporter_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Report, sqlx::Error>;

    async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>, sqlx::Error>;

    /// Close an open report. `None` when it is missing or already resolved.
    async fn resolve_report(
        &self,
        report_id: Uuid,
        status: ReportStatus,
        resolved_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>, sqlx::Error>;

    async fn count_validated_reports(&self, account_id: Uuid) -> Result<i64, sqlx::Error>;
}

#[async_trait]
impl ReputationExt for DBClient {
    async fn record_vote(
        &self,
        vote: NewVote,
        scoring: &VoteScoring,
        at: DateTime<Utc>,
    ) -> Result<VoteOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let context_key = vote.context_key();

        // Serialises every vote for this target behind the stats row lock.
        sqlx::query(
            r#"
            INSERT INTO reputation_stats (account_id, updated_at)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(vote.target_user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("SELECT account_id FROM reputation_stats WHERE account_id = $1 FOR UPDATE")
            .bind(vote.target_user_id)
            .execute(&mut *tx)
            .await?;

        let previous: Option<VoteType> = sqlx::query_scalar(
            r#"
            SELECT vote_type FROM reputation_votes
            WHERE voter_id = $1 AND target_user_id = $2 AND context_key = $3
            "#,
        )
        .bind(vote.voter_id)
        .bind(vote.target_user_id)
        .bind(&context_key)
        .fetch_optional(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, ReputationVote>(
            r#"
            INSERT INTO reputation_votes
                (id, voter_id, target_user_id, vote_type, context, context_id, context_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (voter_id, target_user_id, context_key) DO UPDATE
                SET vote_type = EXCLUDED.vote_type,
                    updated_at = EXCLUDED.updated_at
            RETURNING id, voter_id, target_user_id, vote_type, context, context_id,
                      context_key, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(vote.voter_id)
        .bind(vote.target_user_id)
        .bind(vote.vote_type)
        .bind(vote.context_kind())
        .bind(vote.context_id())
        .bind(&context_key)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        let delta = scoring.delta(previous, vote.vote_type);

        let mut stats = sqlx::query_as::<_, ReputationStats>(
            r#"
            UPDATE reputation_stats
            SET total_points = total_points + $2,
                upvotes_received = upvotes_received + $3,
                downvotes_received = downvotes_received + $4,
                updated_at = $5
            WHERE account_id = $1
            RETURNING account_id, total_points, upvotes_received, downvotes_received, badges_count
            "#,
        )
        .bind(vote.target_user_id)
        .bind(delta.points)
        .bind(delta.upvotes)
        .bind(delta.downvotes)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        let mut new_badges = Vec::new();
        for tier in scoring.tiers_reached(stats.total_points) {
            let awarded = sqlx::query_as::<_, Badge>(
                r#"
                INSERT INTO reputation_badges (id, account_id, tier, points_at_award, awarded_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (account_id, tier) DO NOTHING
                RETURNING id, account_id, tier, points_at_award, awarded_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(vote.target_user_id)
            .bind(tier)
            .bind(stats.total_points)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(badge) = awarded {
                new_badges.push(badge);
            }
        }

        if !new_badges.is_empty() {
            stats.badges_count = sqlx::query_scalar(
                r#"
                UPDATE reputation_stats
                SET badges_count = badges_count + $2
                WHERE account_id = $1
                RETURNING badges_count
                "#,
            )
            .bind(vote.target_user_id)
            .bind(new_badges.len() as i32)
            .fetch_one(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(VoteOutcome {
            vote: stored,
            previous,
            stats,
            new_badges,
        })
    }

    async fn get_reputation_stats(
        &self,
        account_id: Uuid,
    ) -> Result<Option<ReputationStats>, sqlx::Error> {
        sqlx::query_as::<_, ReputationStats>(
            r#"
            SELECT account_id, total_points, upvotes_received, downvotes_received, badges_count
            FROM reputation_stats
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_badges(&self, account_id: Uuid) -> Result<Vec<Badge>, sqlx::Error> {
        sqlx::query_as::<_, Badge>(
            r#"
            SELECT id, account_id, tier, points_at_award, awarded_at
            FROM reputation_badges
            WHERE account_id = $1
            ORDER BY awarded_at ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn count_votes_cast_since(
        &self,
        voter_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM reputation_votes WHERE voter_id = $1 AND updated_at >= $2",
        )
        .bind(voter_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
    }

    async fn create_report(
        &self,
        target_user_id: Uuid,
        reporter_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<Report, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO user_reports (id, target_user_id, reporter_id, reason, status, created_at)
            VALUES ($1, $2, $3, $4, 'open', $5)
            RETURNING id, target_user_id, reporter_id, reason, status, resolved_by, resolved_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(target_user_id)
        .bind(reporter_id)
        .bind(reason)
        .bind(at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            SELECT id, target_user_id, reporter_id, reason, status, resolved_by, resolved_at, created_at
            FROM user_reports
            WHERE id = $1
            "#,
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn resolve_report(
        &self,
        report_id: Uuid,
        status: ReportStatus,
        resolved_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>, sqlx::Error> {
        sqlx::query_as::<_, Report>(
            r#"
            UPDATE user_reports
            SET status = $2, resolved_by = $3, resolved_at = $4
            WHERE id = $1 AND status = 'open'
            RETURNING id, target_user_id, reporter_id, reason, status, resolved_by, resolved_at, created_at
            "#,
        )
        .bind(report_id)
        .bind(status)
        .bind(resolved_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
    }

    async fn count_validated_reports(&self, account_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_reports WHERE target_user_id = $1 AND status = 'validated'",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
    }
}
