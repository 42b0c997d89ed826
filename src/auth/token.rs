//! HS256 tokens carrying a credential payload as claims.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

/// Sign `payload`. Objects become the claim set; anything else is wrapped as `{"payload": ..}`.
/// Adds `iat`, and `exp` when a lifetime is given.
pub fn sign(secret: &str, payload: Value, ttl_secs: Option<u64>) -> Result<String, jsonwebtoken::errors::Error> {
    let mut claims = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("payload".into(), other);
            map
        }
    };
    let now = chrono::Utc::now().timestamp();
    claims.insert("iat".into(), now.into());
    if let Some(ttl) = ttl_secs {
        claims.insert("exp".into(), now.saturating_add(ttl as i64).into());
    }
    encode(
        &Header::new(Algorithm::HS256),
        &Value::Object(claims),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify signature and, when present, expiry. Returns the claims.
pub fn verify(secret: &str, token: &str) -> Result<Value, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    // Payloads are opaque; an `aud` claim must not make the token unverifiable.
    validation.validate_aud = false;
    let data = decode::<Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}
