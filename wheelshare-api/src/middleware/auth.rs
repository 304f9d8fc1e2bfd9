use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use wheelshare_core::{Principal, Role};

use crate::error::AppError;
use crate::state::AppState;

/// Claims minted by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn for_principal(principal: &Principal, ttl_seconds: i64) -> Self {
        Self {
            sub: principal.subject.clone(),
            email: principal.email.expose().clone(),
            name: principal.display_name.clone(),
            role: principal.role.as_str().to_string(),
            exp: (Utc::now().timestamp() + ttl_seconds) as usize,
        }
    }

    pub fn into_principal(self) -> Result<Principal, AppError> {
        let role = Role::parse(&self.role).map_err(|e| AppError::AuthenticationError(e.to_string()))?;
        let principal = Principal::new(self.sub, self.email, role);
        Ok(match self.name {
            Some(name) => principal.with_display_name(name),
            None => principal,
        })
    }
}

pub fn encode_token(claims: &Claims, secret: &str) -> Result<String, AppError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| AppError::AuthenticationError(format!("invalid token: {}", e)))
}

/// Resolves the bearer token to a [`Principal`] in the request extensions.
/// Role checks are left to the handlers.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let principal = decode_token(token, &state.auth.secret)?.into_principal()?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip_keeps_identity() {
        let owner = Principal::new("uid-7", "kim@owner.com", Role::Owner).with_display_name("Kim");
        let token = encode_token(&Claims::for_principal(&owner, 600), SECRET).unwrap();

        let principal = decode_token(&token, SECRET).unwrap().into_principal().unwrap();
        assert_eq!(principal, owner);
    }

    #[test]
    fn test_wrong_secret_and_expiry_are_rejected() {
        let renter = Principal::new("uid-8", "lee@renter.com", Role::Renter);

        let token = encode_token(&Claims::for_principal(&renter, 600), SECRET).unwrap();
        assert!(matches!(decode_token(&token, "other"), Err(AppError::AuthenticationError(_))));

        let stale = encode_token(&Claims::for_principal(&renter, -3600), SECRET).unwrap();
        assert!(matches!(decode_token(&stale, SECRET), Err(AppError::AuthenticationError(_))));
    }

    #[test]
    fn test_unknown_role_is_an_authentication_failure() {
        let claims = Claims {
            sub: "uid-9".into(),
            email: "x@y.com".into(),
            name: None,
            role: "ADMIN".into(),
            exp: usize::MAX,
        };
        assert!(matches!(claims.into_principal(), Err(AppError::AuthenticationError(_))));
    }
}
