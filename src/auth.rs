//! Bearer-token authentication for the OCR endpoints.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::error::GatewayError;
use crate::AppState;

/// Header identifying the end user; forwarded to ingestion as the session.
pub const USER_ID_HEADER: &str = "user_id";
const DEFAULT_USER: &str = "user";

/// Token of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.settings.gateway_api_key.as_deref() {
            let token = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|val| val.to_str().ok())
                .and_then(bearer_token);

            match token {
                Some(token) if token == expected => {}
                Some(_) => {
                    warn!("Rejected request with invalid bearer token");
                    return Err(GatewayError::Unauthorized("Invalid token"));
                }
                None => {
                    warn!("Missing or invalid Authorization header");
                    return Err(GatewayError::Unauthorized("Missing credentials"));
                }
            }
        }

        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|val| val.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_USER)
            .to_string();

        Ok(Caller { user_id })
    }
}
