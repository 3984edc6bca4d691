use anyhow::Result;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::routes::AppState;

const TOKEN_DURATION_SECS: i64 = 24 * 3600;

/// Subject claim. Issuers in the wild send user ids both as strings and numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    Text(String),
    Number(i64),
}

impl Subject {
    pub fn user_id(&self) -> String {
        match self {
            Subject::Text(s) => s.clone(),
            Subject::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Subject,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// HS256 bearer tokens signed with `JWT_SECRET`.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn create_token(&self, user_id: &str) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: Subject::Text(user_id.to_string()),
            exp: (now + chrono::Duration::seconds(TOKEN_DURATION_SECS)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify signature and expiry.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// `Authorization: Bearer <token>` value, if present.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The authenticated caller. Handlers that take this reject with 401 when
/// the bearer token is missing or invalid.
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .and_then(|token| state.jwt.verify_token(token).ok());

        match claims {
            Some(claims) => Ok(AuthUser(claims.sub.user_id())),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "missing or invalid bearer token"})),
            )
                .into_response()),
        }
    }
}
