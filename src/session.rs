use crate::error::{Result, StoreError};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Signs a session token for `user_id` valid for `ttl`.
pub fn issue_token(secret: &str, user_id: i64, ttl: Duration) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| StoreError::Auth(format!("cannot sign session: {e}")))
}

/// Returns the user id carried by a valid, unexpired token.
pub fn verify_token(secret: &str, token: &str) -> Result<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| StoreError::Auth(format!("invalid session: {e}")))?;

    data.claims
        .sub
        .parse::<i64>()
        .map_err(|_| StoreError::Auth("invalid session subject".to_string()))
}
