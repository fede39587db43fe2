// config.rs
use std::str::FromStr;

use anyhow::Context;
use chrono::Duration;

use crate::models::{
    reputationmodels::{BadgeTier, VoteScoring},
    verificationmodels::{level_index, AccountKind, DocumentType, MAX_LEVEL, MIN_LEVEL},
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    // Collaborators
    pub payment_api_url: String,
    pub payment_secret_key: String,
    pub storage_api_url: String,
    pub storage_api_key: String,
    pub dependency_timeout: std::time::Duration,
    // Background jobs
    pub auto_release_interval: std::time::Duration,
    pub expiry_sweep_interval: std::time::Duration,
    // Policy
    pub trust: TrustWeights,
    pub verification: VerificationPolicy,
    pub escrow: EscrowPolicy,
    pub reputation: ReputationPolicy,
}

impl Config {
    pub fn init() -> anyhow::Result<Config> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET_KEY").context("JWT_SECRET_KEY must be set")?;
        let jwt_maxage = env_or("JWT_MAXAGE", 60_i64)?;
        let port = env_or("PORT", 8000_u16)?;
        let log_level = std::env::var("RUST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:8000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let payment_api_url = std::env::var("PAYMENT_API_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());
        let payment_secret_key = std::env::var("PAYMENT_SECRET_KEY")
            .unwrap_or_else(|_| "test_secret_key".to_string());
        let storage_api_url = std::env::var("STORAGE_API_URL")
            .unwrap_or_else(|_| "http://localhost:9000/documents".to_string());
        let storage_api_key = std::env::var("STORAGE_API_KEY").unwrap_or_default();

        let dependency_timeout =
            std::time::Duration::from_secs(env_or("DEPENDENCY_TIMEOUT_SECS", 10_u64)?);
        let auto_release_interval =
            std::time::Duration::from_secs(env_or("AUTO_RELEASE_INTERVAL_SECS", 300_u64)?);
        let expiry_sweep_interval =
            std::time::Duration::from_secs(env_or("EXPIRY_SWEEP_INTERVAL_SECS", 3600_u64)?);

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_maxage,
            port,
            log_level,
            allowed_origins,
            payment_api_url,
            payment_secret_key,
            storage_api_url,
            storage_api_key,
            dependency_timeout,
            auto_release_interval,
            expiry_sweep_interval,
            trust: TrustWeights::from_env()?,
            verification: VerificationPolicy::from_env()?,
            escrow: EscrowPolicy::from_env()?,
            reputation: ReputationPolicy::from_env()?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Tunable weights of the trust score.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustWeights {
    pub base: i32,
    pub l1_bonus: i32,
    pub positive_weight: i32,
    pub negative_weight: i32,
    pub report_weight: i32,
    pub cancellation_weight: i32,
    pub response_divisor: i32,
    pub floor: i32,
    pub suspension_threshold: i32,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            base: 50,
            l1_bonus: 30,
            positive_weight: 5,
            negative_weight: 10,
            report_weight: 15,
            cancellation_weight: 5,
            response_divisor: 5,
            floor: 0,
            suspension_threshold: 25,
        }
    }
}

impl TrustWeights {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let weights = Self {
            base: env_or("TRUST_BASE", d.base)?,
            l1_bonus: env_or("TRUST_L1_BONUS", d.l1_bonus)?,
            positive_weight: env_or("TRUST_POSITIVE_WEIGHT", d.positive_weight)?,
            negative_weight: env_or("TRUST_NEGATIVE_WEIGHT", d.negative_weight)?,
            report_weight: env_or("TRUST_REPORT_WEIGHT", d.report_weight)?,
            cancellation_weight: env_or("TRUST_CANCELLATION_WEIGHT", d.cancellation_weight)?,
            response_divisor: env_or("TRUST_RESPONSE_DIVISOR", d.response_divisor)?,
            floor: env_or("TRUST_FLOOR", d.floor)?,
            suspension_threshold: env_or("TRUST_SUSPENSION_THRESHOLD", d.suspension_threshold)?,
        };

        let non_negative = [
            ("TRUST_BASE", weights.base),
            ("TRUST_L1_BONUS", weights.l1_bonus),
            ("TRUST_POSITIVE_WEIGHT", weights.positive_weight),
            ("TRUST_NEGATIVE_WEIGHT", weights.negative_weight),
            ("TRUST_REPORT_WEIGHT", weights.report_weight),
            ("TRUST_CANCELLATION_WEIGHT", weights.cancellation_weight),
        ];
        for (key, value) in non_negative {
            if value < 0 {
                anyhow::bail!("{} must not be negative", key);
            }
        }
        if weights.response_divisor <= 0 {
            anyhow::bail!("TRUST_RESPONSE_DIVISOR must be positive");
        }
        if weights.floor < 0 {
            anyhow::bail!("TRUST_FLOOR must not be negative");
        }
        Ok(weights)
    }
}

/// One requirement of a level: any approved document of one of these types
/// satisfies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRequirement {
    pub any_of: Vec<DocumentType>,
}

impl LevelRequirement {
    fn any_of(types: &[DocumentType]) -> Self {
        Self {
            any_of: types.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Indexed by level - 1.
    pub requirements: [Vec<LevelRequirement>; 4],
    /// Wait between approval of level N-1 and level N becoming requestable,
    /// indexed by level - 1. The entry for level 1 is unused.
    pub cooling_periods: [Duration; 4],
    pub seeker_max_level: i16,
    pub provider_max_level: i16,
    pub pending_document_ttl: Duration,
    pub expiry_batch_size: i64,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        use DocumentType::*;

        Self {
            requirements: [
                vec![
                    LevelRequirement::any_of(&[NationalId, Passport]),
                    LevelRequirement::any_of(&[Selfie]),
                ],
                vec![LevelRequirement::any_of(&[ProofOfAddress])],
                vec![LevelRequirement::any_of(&[PropertyTitle, BusinessRegistration])],
                vec![LevelRequirement::any_of(&[SiteInspection])],
            ],
            cooling_periods: [
                Duration::zero(),
                Duration::days(1),
                Duration::days(7),
                Duration::days(30),
            ],
            seeker_max_level: MIN_LEVEL,
            provider_max_level: MAX_LEVEL,
            pending_document_ttl: Duration::days(30),
            expiry_batch_size: 200,
        }
    }
}

impl VerificationPolicy {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut policy = Self::default();
        for level in (MIN_LEVEL + 1)..=MAX_LEVEL {
            let i = (level - 1) as usize;
            let default_hours = policy.cooling_periods[i].num_hours();
            let hours = env_or(&format!("VERIFICATION_L{}_COOLING_HOURS", level), default_hours)?;
            policy.cooling_periods[i] = Duration::hours(hours);
        }
        policy.pending_document_ttl = Duration::hours(env_or(
            "VERIFICATION_PENDING_TTL_HOURS",
            policy.pending_document_ttl.num_hours(),
        )?);
        policy.expiry_batch_size = env_or("VERIFICATION_EXPIRY_BATCH", policy.expiry_batch_size)?;
        Ok(policy)
    }

    pub fn requirements_for(&self, level: i16) -> &[LevelRequirement] {
        match level_index(level) {
            Some(i) => &self.requirements[i],
            None => &[],
        }
    }

    pub fn accepts_document(&self, level: i16, document_type: DocumentType) -> bool {
        self.requirements_for(level)
            .iter()
            .any(|req| req.any_of.contains(&document_type))
    }

    pub fn cooling_period(&self, level: i16) -> Duration {
        level_index(level)
            .map(|i| self.cooling_periods[i])
            .unwrap_or_else(Duration::zero)
    }

    pub fn max_level_for(&self, kind: AccountKind) -> i16 {
        match kind {
            AccountKind::Seeker => self.seeker_max_level,
            AccountKind::Provider => self.provider_max_level,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EscrowPolicy {
    pub auto_release_window: Duration,
    pub min_provider_level: i16,
    pub sweep_batch_size: i64,
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            auto_release_window: Duration::days(7),
            min_provider_level: 1,
            sweep_batch_size: 100,
        }
    }
}

impl EscrowPolicy {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let min_provider_level = env_or("ESCROW_MIN_PROVIDER_LEVEL", d.min_provider_level)?;
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&min_provider_level) {
            anyhow::bail!("ESCROW_MIN_PROVIDER_LEVEL must be between 1 and 4");
        }

        Ok(Self {
            auto_release_window: Duration::hours(env_or(
                "ESCROW_AUTO_RELEASE_HOURS",
                d.auto_release_window.num_hours(),
            )?),
            min_provider_level,
            sweep_batch_size: env_or("ESCROW_SWEEP_BATCH", d.sweep_batch_size)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReputationPolicy {
    pub upvote_points: i32,
    pub downvote_points: i32,
    pub daily_vote_limit: i64,
    pub badge_thresholds: Vec<(BadgeTier, i32)>,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            upvote_points: 10,
            downvote_points: 5,
            daily_vote_limit: 50,
            badge_thresholds: vec![
                (BadgeTier::Bronze, 50),
                (BadgeTier::Silver, 200),
                (BadgeTier::Gold, 500),
                (BadgeTier::Platinum, 1000),
            ],
        }
    }
}

impl ReputationPolicy {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        Ok(Self {
            upvote_points: env_or("REPUTATION_UPVOTE_POINTS", d.upvote_points)?,
            downvote_points: env_or("REPUTATION_DOWNVOTE_POINTS", d.downvote_points)?,
            daily_vote_limit: env_or("REPUTATION_DAILY_VOTE_LIMIT", d.daily_vote_limit)?,
            badge_thresholds: d.badge_thresholds,
        })
    }

    pub fn scoring(&self) -> VoteScoring {
        VoteScoring {
            upvote_points: self.upvote_points,
            downvote_points: self.downvote_points,
            badge_thresholds: self.badge_thresholds.clone(),
        }
    }
}
