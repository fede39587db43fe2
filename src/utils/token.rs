use axum::http::StatusCode;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorMessage, HttpError};

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<TokenClaims, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) => Ok(token.claims),
        Err(_) => Err(HttpError::new(ErrorMessage::InvalidToken.to_string(), StatusCode::UNAUTHORIZED)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_token(
        user_id: &str,
        role: &str,
        secret: &[u8],
        expires_in_seconds: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        if user_id.is_empty() {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
        }

        let now = Utc::now();
        let iat = now.timestamp() as usize;
        let exp = (now + Duration::seconds(expires_in_seconds)).timestamp() as usize;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            role: role.to_string(),
            iat,
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
    }

    #[test]
    fn token_round_trip_keeps_subject_and_role() {
        let secret = b"test-secret";
        let token = create_token("7f1c3a4e-0000-0000-0000-000000000001", "admin", secret, 600).unwrap();
        let claims = decode_token(token, secret).unwrap();
        assert_eq!(claims.sub, "7f1c3a4e-0000-0000-0000-000000000001");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = create_token("someone", "user", b"one", 600).unwrap();
        assert!(decode_token(token, b"two").is_err());
    }

    #[test]
    fn empty_subject_is_refused() {
        assert!(create_token("", "user", b"secret", 600).is_err());
    }
}
