use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use rag_core::error::{EngineError, EngineResult};

/// Same shape as the teacher's `Claims`, with `user_id` widened from `i32`
/// to `Uuid` to match this engine's user identifiers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: String,
    pub user_id: Uuid,
}

pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_seconds: u64,
}

impl JwtManager {
    pub fn new(secret: &str, expiration_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_seconds,
        }
    }

    pub fn generate_token(&self, user_id: Uuid, role: &str) -> EngineResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| EngineError::Internal(e.to_string()))?
            .as_secs() as usize;
        let expiration = now + self.expiration_seconds as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            exp: expiration,
            role: role.to_string(),
            user_id,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| EngineError::Internal(format!("jwt encode failed: {e}")))
    }

    pub fn validate_token(&self, token: &str) -> EngineResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| EngineError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_claims() {
        let mgr = JwtManager::new("test-secret", 3600);
        let user_id = Uuid::new_v4();
        let token = mgr.generate_token(user_id, "user").unwrap();
        let claims = mgr.validate_token(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn rejects_garbage_token() {
        let mgr = JwtManager::new("test-secret", 3600);
        assert!(mgr.validate_token("not-a-jwt").is_err());
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let mgr_a = JwtManager::new("secret-a", 3600);
        let mgr_b = JwtManager::new("secret-b", 3600);
        let token = mgr_a.generate_token(Uuid::new_v4(), "user").unwrap();
        assert!(mgr_b.validate_token(&token).is_err());
    }
}
