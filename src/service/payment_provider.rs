// service/payment_provider.rs
use async_trait::async_trait;
use serde::Deserialize;

use crate::{config::Config, service::error::ServiceError};

const DEPENDENCY: &str = "payment collector";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingConfirmation {
    Confirmed { amount_xaf: i64 },
    Declined { reason: String },
}

/// Confirms that a client's payment for an escrow actually landed.
#[async_trait]
pub trait PaymentCollector: Send + Sync + std::fmt::Debug {
    async fn confirm_funding(&self, reference: &str) -> Result<FundingConfirmation, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    message: String,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    currency: Option<String>,
    gateway_response: Option<String>,
}

/// Gateway client speaking the Paystack-style `transaction/verify` API.
#[derive(Debug, Clone)]
pub struct HttpPaymentCollector {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.payment_api_url.trim_end_matches('/').to_string(),
            secret_key: config.payment_secret_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentCollector for HttpPaymentCollector {
    async fn confirm_funding(&self, reference: &str) -> Result<FundingConfirmation, ServiceError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .send()
            .await
            .map_err(|e| ServiceError::dependency(DEPENDENCY, e.to_string()))?;

        if response.status().is_server_error() {
            return Err(ServiceError::dependency(
                DEPENDENCY,
                format!("gateway answered {}", response.status()),
            ));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::dependency(DEPENDENCY, e.to_string()))?;

        let data = match (body.status, body.data) {
            (true, Some(data)) => data,
            _ => {
                return Ok(FundingConfirmation::Declined {
                    reason: body.message,
                })
            }
        };

        if let Some(currency) = data.currency.as_deref() {
            if !currency.eq_ignore_ascii_case("XAF") {
                return Ok(FundingConfirmation::Declined {
                    reason: format!("payment was made in {}", currency),
                });
            }
        }

        if data.status == "success" {
            Ok(FundingConfirmation::Confirmed {
                amount_xaf: data.amount,
            })
        } else {
            Ok(FundingConfirmation::Declined {
                reason: data.gateway_response.unwrap_or(data.status),
            })
        }
    }
}
