// dtos/trustdtos.rs
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{
        reputationmodels::{VoteContext, VoteType},
        verificationmodels::{DocumentDecision, DocumentType},
    },
    service::{
        escrow_service::{DisputeResolution, PayoutOutcome},
        verification_service::{DocumentSource, DocumentSubmission},
    },
};

/// Largest inline upload accepted, after base64 decoding.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct SubmitDocumentDto {
    pub document_type: DocumentType,

    #[validate(range(min = 1, max = 4, message = "Level must be between 1 and 4"))]
    pub level: i16,

    #[validate(url(message = "file_url must be a valid URL"))]
    pub file_url: Option<String>,

    /// Raw base64 or a `data:<type>;base64,` URL.
    pub file_base64: Option<String>,

    #[validate(range(min = 0.0, max = 1.0, message = "face_match_score must be between 0 and 1"))]
    pub face_match_score: Option<f64>,
}

impl SubmitDocumentDto {
    pub fn into_submission(self) -> Result<DocumentSubmission, String> {
        let source = match (self.file_url, self.file_base64) {
            (Some(url), None) => DocumentSource::Url(url),
            (None, Some(data)) => decode_upload(&data)?,
            (Some(_), Some(_)) => {
                return Err("Provide either file_url or file_base64, not both".to_string())
            }
            (None, None) => return Err("file_url or file_base64 is required".to_string()),
        };

        Ok(DocumentSubmission {
            document_type: self.document_type,
            level: self.level,
            source,
            face_match_score: self.face_match_score,
        })
    }
}

fn decode_upload(data: &str) -> Result<DocumentSource, String> {
    let (content_type, encoded) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (meta, encoded) = rest
                .split_once(',')
                .ok_or_else(|| "Malformed data URL".to_string())?;
            let content_type = meta.trim_end_matches(";base64");
            (content_type.to_string(), encoded)
        }
        None => ("application/octet-stream".to_string(), data),
    };

    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("Failed to decode base64: {}", e))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err("Document is larger than 10 MB".to_string());
    }

    Ok(DocumentSource::Upload {
        bytes,
        content_type,
    })
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct DecideDocumentDto {
    pub decision: DocumentDecision,

    #[validate(length(max = 500, message = "Review notes must be less than 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct RejectLevelDto {
    #[validate(length(min = 1, max = 500, message = "A reason of at most 500 characters is required"))]
    pub reason: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct LiftSuspensionDto {
    #[validate(length(min = 1, max = 500, message = "A note is required"))]
    pub note: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct ResponseRateDto {
    #[validate(range(min = 0, max = 100, message = "response_rate must be between 0 and 100"))]
    pub response_rate: i32,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct CastVoteDto {
    pub target_user_id: Uuid,
    pub vote_type: VoteType,

    pub context: Option<VoteContext>,

    pub context_id: Option<Uuid>,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct FileReportDto {
    pub target_user_id: Uuid,

    #[validate(length(min = 5, max = 1000, message = "Reason must be between 5 and 1000 characters"))]
    pub reason: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct ResolveReportDto {
    pub validated: bool,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct CreateEscrowDto {
    pub quote_id: Uuid,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct FundEscrowDto {
    #[validate(length(min = 1, max = 100, message = "payment_reference is required"))]
    pub payment_reference: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct ReasonDto {
    #[validate(length(min = 1, max = 1000, message = "A reason is required"))]
    pub reason: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct ResolveDisputeDto {
    pub resolution: DisputeResolution,

    #[validate(length(min = 1, max = 1000, message = "A resolution note is required"))]
    pub note: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct SettlePayoutDto {
    pub completed: bool,

    #[validate(length(min = 1, max = 100))]
    pub external_reference: Option<String>,

    #[validate(length(min = 1, max = 500))]
    pub failure_reason: Option<String>,
}

impl SettlePayoutDto {
    pub fn into_outcome(self) -> Result<PayoutOutcome, String> {
        if self.completed {
            self.external_reference
                .map(|external_reference| PayoutOutcome::Completed { external_reference })
                .ok_or_else(|| "external_reference is required for a completed payout".to_string())
        } else {
            self.failure_reason
                .map(|reason| PayoutOutcome::Failed { reason })
                .ok_or_else(|| "failure_reason is required for a failed payout".to_string())
        }
    }
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct CommissionPreviewQuery {
    #[validate(range(min = 1, message = "amount_xaf must be positive"))]
    pub amount_xaf: i64,

    #[validate(length(equal = 2, message = "country_code must be two letters"))]
    pub country_code: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct PageQueryDto {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,

    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Response<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

impl<T: Serialize> Response<T> {
    pub fn success(data: T) -> Self {
        Response {
            status: "success",
            data,
        }
    }
}
