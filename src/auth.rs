use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id as a UUID string.
    pub sub: String,
    /// Expiration time (unix timestamp).
    pub exp: i64,
}

/// Credential check performed on the `authenticate` event.
///
/// Kept behind a trait so the protocol handlers can be exercised without a
/// signing authority; production uses [`JwtTokenValidator`].
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> AppResult<Uuid>;
}

pub struct JwtTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> AppResult<Uuid> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AppError::Unauthenticated)?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    fn token_for(sub: &str, exp: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn accepts_a_valid_token() {
        let user_id = Uuid::new_v4();
        let validator = JwtTokenValidator::new(SECRET);
        let token = token_for(&user_id.to_string(), future_exp());
        assert_eq!(validator.validate(&token).await.unwrap(), user_id);
    }

    #[tokio::test]
    async fn rejects_an_expired_token() {
        let validator = JwtTokenValidator::new(SECRET);
        let token = token_for(&Uuid::new_v4().to_string(), 1_000_000);
        assert!(matches!(
            validator.validate(&token).await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn rejects_a_token_signed_with_another_secret() {
        let validator = JwtTokenValidator::new(b"other-secret");
        let token = token_for(&Uuid::new_v4().to_string(), future_exp());
        assert!(validator.validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn rejects_a_subject_that_is_not_a_uuid() {
        let validator = JwtTokenValidator::new(SECRET);
        let token = token_for("alice", future_exp());
        assert!(validator.validate(&token).await.is_err());
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let validator = JwtTokenValidator::new(SECRET);
        assert!(validator.validate("not-a-jwt").await.is_err());
    }
}
