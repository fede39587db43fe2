// models/reputationmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "vote_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn to_str(&self) -> &str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }
}

/// What a contextual vote is attached to. Every kind carries an id the
/// service checks before the vote is stored.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "vote_context", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VoteContext {
    Transaction,
}

impl VoteContext {
    pub fn to_str(&self) -> &str {
        match self {
            VoteContext::Transaction => "transaction",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReputationVote {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub target_user_id: Uuid,
    pub vote_type: VoteType,
    pub context: Option<VoteContext>,
    pub context_id: Option<Uuid>,
    pub context_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVote {
    pub voter_id: Uuid,
    pub target_user_id: Uuid,
    pub vote_type: VoteType,
    pub context: Option<(VoteContext, Uuid)>,
}

impl NewVote {
    /// Uniqueness key for (voter, target, context). A vote without context has
    /// the empty key, so there is a single context-free vote per pair.
    pub fn context_key(&self) -> String {
        match self.context {
            None => String::new(),
            Some((kind, id)) => format!("{}:{}", kind.to_str(), id),
        }
    }

    pub fn context_kind(&self) -> Option<VoteContext> {
        self.context.map(|(kind, _)| kind)
    }

    pub fn context_id(&self) -> Option<Uuid> {
        self.context.map(|(_, id)| id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReputationStats {
    pub account_id: Uuid,
    pub total_points: i32,
    pub upvotes_received: i32,
    pub downvotes_received: i32,
    pub badges_count: i32,
}

impl ReputationStats {
    pub fn empty(account_id: Uuid) -> Self {
        Self {
            account_id,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, delta: StatsDelta) {
        self.total_points += delta.points;
        self.upvotes_received += delta.upvotes;
        self.downvotes_received += delta.downvotes;
    }
}

/// Points carried by each vote direction and the badge ladder.
#[derive(Debug, Clone)]
pub struct VoteScoring {
    pub upvote_points: i32,
    pub downvote_points: i32,
    pub badge_thresholds: Vec<(BadgeTier, i32)>,
}

impl VoteScoring {
    fn contribution(&self, vote: VoteType) -> StatsDelta {
        match vote {
            VoteType::Up => StatsDelta {
                points: self.upvote_points,
                upvotes: 1,
                downvotes: 0,
            },
            VoteType::Down => StatsDelta {
                points: -self.downvote_points,
                upvotes: 0,
                downvotes: 1,
            },
        }
    }

    /// Change to apply to the target's stats when `previous` (if any) is
    /// replaced by `new`. The old contribution is reversed, never stacked.
    pub fn delta(&self, previous: Option<VoteType>, new: VoteType) -> StatsDelta {
        let added = self.contribution(new);
        match previous {
            None => added,
            Some(old) if old == new => StatsDelta::default(),
            Some(old) => added.minus(self.contribution(old)),
        }
    }

    /// Tiers whose threshold is met by `total_points`, lowest first.
    pub fn tiers_reached(&self, total_points: i32) -> Vec<BadgeTier> {
        self.badge_thresholds
            .iter()
            .filter(|(_, threshold)| total_points >= *threshold)
            .map(|(tier, _)| *tier)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub points: i32,
    pub upvotes: i32,
    pub downvotes: i32,
}

impl StatsDelta {
    fn minus(self, other: StatsDelta) -> StatsDelta {
        StatsDelta {
            points: self.points - other.points,
            upvotes: self.upvotes - other.upvotes,
            downvotes: self.downvotes - other.downvotes,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == StatsDelta::default()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "badge_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BadgeTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl BadgeTier {
    pub fn to_str(&self) -> &str {
        match self {
            BadgeTier::Bronze => "bronze",
            BadgeTier::Silver => "silver",
            BadgeTier::Gold => "gold",
            BadgeTier::Platinum => "platinum",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Badge {
    pub id: Uuid,
    pub account_id: Uuid,
    pub tier: BadgeTier,
    pub points_at_award: i32,
    pub awarded_at: DateTime<Utc>,
}

/// Result of an atomic vote upsert.
#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub vote: ReputationVote,
    pub previous: Option<VoteType>,
    pub stats: ReputationStats,
    pub new_badges: Vec<Badge>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Validated,
    Dismissed,
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Report {
    pub id: Uuid,
    pub target_user_id: Uuid,
    pub reporter_id: Uuid,
    pub reason: String,
    pub status: ReportStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
