use crate::models::viewer::{Role, Viewer};
use crate::AppState;
use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenQuery {
    access_token: Option<String>,
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

/// Verifies the bearer token and inserts the resulting [`Viewer`] as a
/// request extension. The token comes from the `Authorization` header or,
/// when that is absent, an `access_token` query parameter.
pub async fn require_viewer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match req.headers().get(axum::http::header::AUTHORIZATION) {
        Some(auth_header) => {
            let Ok(auth_str) = auth_header.to_str() else {
                return reject(StatusCode::UNAUTHORIZED, "bad_authorization");
            };
            let Some(token) = auth_str.strip_prefix("Bearer ") else {
                return reject(StatusCode::UNAUTHORIZED, "unsupported_scheme");
            };
            token.to_string()
        }
        // Browser WebSocket clients cannot set headers.
        None => match Query::<TokenQuery>::try_from_uri(req.uri()) {
            Ok(Query(TokenQuery {
                access_token: Some(token),
            })) if !token.is_empty() => token,
            _ => return reject(StatusCode::UNAUTHORIZED, "missing_authorization"),
        },
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let claims = match decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            return reject(StatusCode::UNAUTHORIZED, "invalid_token");
        }
    };

    let role: Role = match claims.role.as_deref().unwrap_or_default().parse() {
        Ok(role) => role,
        Err(_) => return reject(StatusCode::FORBIDDEN, "forbidden"),
    };
    let viewer = Viewer {
        name: claims.name.clone().unwrap_or_else(|| claims.sub.clone()),
        id: claims.sub,
        role,
    };

    req.extensions_mut().insert(viewer);
    next.run(req).await
}
