// models/verificationmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

pub const MIN_LEVEL: i16 = 1;
pub const MAX_LEVEL: i16 = 4;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "account_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Seeker,
    Provider,
}

impl AccountKind {
    pub fn to_str(&self) -> &str {
        match self {
            AccountKind::Seeker => "seeker",
            AccountKind::Provider => "provider",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "level_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Unstarted,
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl LevelStatus {
    pub fn to_str(&self) -> &str {
        match self {
            LevelStatus::Unstarted => "unstarted",
            LevelStatus::Pending => "pending",
            LevelStatus::Approved => "approved",
            LevelStatus::Rejected => "rejected",
            LevelStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "document_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl DocumentStatus {
    pub fn to_str(&self) -> &str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Pending)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "document_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    NationalId,
    Passport,
    Selfie,
    ProofOfAddress,
    PropertyTitle,
    BusinessRegistration,
    SiteInspection,
}

impl DocumentType {
    pub fn to_str(&self) -> &str {
        match self {
            DocumentType::NationalId => "national_id",
            DocumentType::Passport => "passport",
            DocumentType::Selfie => "selfie",
            DocumentType::ProofOfAddress => "proof_of_address",
            DocumentType::PropertyTitle => "property_title",
            DocumentType::BusinessRegistration => "business_registration",
            DocumentType::SiteInspection => "site_inspection",
        }
    }
}

/// When a level may be started. `level_N_eligible_at` is NULL in the store
/// until the previous level is approved; that NULL maps to `NotEligible`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum EligibleAt {
    NotEligible,
    At(DateTime<Utc>),
}

impl EligibleAt {
    pub fn from_column(value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(at) => EligibleAt::At(at),
            None => EligibleAt::NotEligible,
        }
    }

    pub fn to_column(&self) -> Option<DateTime<Utc>> {
        match self {
            EligibleAt::NotEligible => None,
            EligibleAt::At(at) => Some(*at),
        }
    }

    pub fn reached(&self, now: DateTime<Utc>) -> bool {
        match self {
            EligibleAt::NotEligible => false,
            EligibleAt::At(at) => *at <= now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelState {
    pub status: LevelStatus,
    pub eligible_at: EligibleAt,
}

impl LevelState {
    pub fn unstarted() -> Self {
        Self {
            status: LevelStatus::Unstarted,
            eligible_at: EligibleAt::NotEligible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub account_id: Uuid,
    pub account_kind: AccountKind,
    pub current_level: i16,
    pub levels: [LevelState; 4],
    pub trust_score: i32,
    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    /// Last admin reinstatement. While the stored score is still under the
    /// threshold, it keeps the account from being suspended again.
    pub suspension_lifted_at: Option<DateTime<Utc>>,
    pub positive_reviews_count: i32,
    pub negative_reviews_count: i32,
    pub reports_count: i32,
    pub response_rate: i32,
    pub cancellation_count: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position of a level in `VerificationRecord::levels`, or `None` when the
/// number is outside 1..=4.
pub fn level_index(level: i16) -> Option<usize> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        Some((level - 1) as usize)
    } else {
        None
    }
}

impl VerificationRecord {
    /// Fresh record: level 1 is requestable immediately, everything above is
    /// locked until the level below it is approved.
    pub fn new(account_id: Uuid, account_kind: AccountKind, now: DateTime<Utc>) -> Self {
        let mut levels = [LevelState::unstarted(); 4];
        levels[0].eligible_at = EligibleAt::At(now);

        Self {
            account_id,
            account_kind,
            current_level: MIN_LEVEL,
            levels,
            trust_score: 0,
            is_suspended: false,
            suspension_reason: None,
            suspended_at: None,
            suspension_lifted_at: None,
            positive_reviews_count: 0,
            negative_reviews_count: 0,
            reports_count: 0,
            response_rate: 0,
            cancellation_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn level(&self, level: i16) -> Option<&LevelState> {
        level_index(level).map(|i| &self.levels[i])
    }

    pub fn level_mut(&mut self, level: i16) -> Option<&mut LevelState> {
        level_index(level).map(move |i| &mut self.levels[i])
    }

    pub fn is_level_approved(&self, level: i16) -> bool {
        self.level(level)
            .map(|state| state.status == LevelStatus::Approved)
            .unwrap_or(false)
    }

    pub fn highest_approved_level(&self) -> i16 {
        let mut highest = 0;
        for level in MIN_LEVEL..=MAX_LEVEL {
            if self.is_level_approved(level) {
                highest = level;
            } else {
                break;
            }
        }
        highest
    }

    /// `level N approved => level N-1 approved` for every N in 2..=4.
    pub fn level_chain_holds(&self) -> bool {
        (MIN_LEVEL + 1..=MAX_LEVEL)
            .all(|level| !self.is_level_approved(level) || self.is_level_approved(level - 1))
    }
}

impl<'r> FromRow<'r, PgRow> for VerificationRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let mut levels = [LevelState::unstarted(); 4];
        for (i, state) in levels.iter_mut().enumerate() {
            let n = i + 1;
            state.status = row.try_get(format!("level_{}_status", n).as_str())?;
            state.eligible_at = EligibleAt::from_column(
                row.try_get(format!("level_{}_eligible_at", n).as_str())?,
            );
        }

        Ok(Self {
            account_id: row.try_get("account_id")?,
            account_kind: row.try_get("account_kind")?,
            current_level: row.try_get("current_level")?,
            levels,
            trust_score: row.try_get("trust_score")?,
            is_suspended: row.try_get("is_suspended")?,
            suspension_reason: row.try_get("suspension_reason")?,
            suspended_at: row.try_get("suspended_at")?,
            suspension_lifted_at: row.try_get("suspension_lifted_at")?,
            positive_reviews_count: row.try_get("positive_reviews_count")?,
            negative_reviews_count: row.try_get("negative_reviews_count")?,
            reports_count: row.try_get("reports_count")?,
            response_rate: row.try_get("response_rate")?,
            cancellation_count: row.try_get("cancellation_count")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct VerificationDocument {
    pub id: Uuid,
    pub account_id: Uuid,
    pub document_type: DocumentType,
    pub verification_level: i16,
    pub status: DocumentStatus,
    pub file_url: String,
    pub content_hash: Option<String>,
    pub face_match_score: Option<f64>,
    pub duplicate_detected: bool,
    pub reviewed_by: Option<Uuid>,
    pub review_notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVerificationDocument {
    pub account_id: Uuid,
    pub document_type: DocumentType,
    pub verification_level: i16,
    pub file_url: String,
    pub content_hash: Option<String>,
    pub face_match_score: Option<f64>,
    pub duplicate_detected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentDecision {
    Approved,
    Rejected,
}

impl DocumentDecision {
    pub fn as_status(&self) -> DocumentStatus {
        match self {
            DocumentDecision::Approved => DocumentStatus::Approved,
            DocumentDecision::Rejected => DocumentStatus::Rejected,
        }
    }
}

/// Per-level answer of `check_eligibility`.
#[derive(Debug, Clone, Serialize)]
pub struct LevelEligibility {
    pub level: i16,
    pub status: LevelStatus,
    pub eligible_at: EligibleAt,
    pub allowed_for_account: bool,
    pub can_start_now: bool,
}
