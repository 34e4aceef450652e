use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::BookingError;
use crate::models::{Actor, Role, UserId};
use crate::AppState;

/// Заголовки доверенного шлюза, когда проверка JWT выключена.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

// Токены выпускает внешний сервис авторизации
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// Аутентифицированный пользователь запроса.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

impl AuthUser {
    pub fn actor(&self) -> &Actor {
        &self.0
    }

    /// Для административных ручек.
    pub fn require_admin(&self) -> Result<&Actor, BookingError> {
        if self.0.is_privileged() {
            Ok(&self.0)
        } else {
            Err(BookingError::Forbidden(format!("{} is not an administrator", self.0.user_id)))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let actor = if state.config.features.enable_auth {
            actor_from_bearer(&parts.headers, &state.config.jwt.secret)?
        } else {
            actor_from_gateway(&parts.headers)?
        };
        Ok(AuthUser(actor))
    }
}

fn actor_from_bearer(headers: &HeaderMap, secret: &str) -> Result<Actor, BookingError> {
    // Получаем заголовок Authorization
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(BookingError::Unauthenticated)?;

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {}", e);
        BookingError::Unauthenticated
    })?;

    if data.claims.sub.is_empty() {
        return Err(BookingError::Unauthenticated);
    }
    Ok(Actor { user_id: UserId::new(data.claims.sub), role: data.claims.role })
}

fn actor_from_gateway(headers: &HeaderMap) -> Result<Actor, BookingError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(BookingError::Unauthenticated)?;

    // Без роли - обычный покупатель
    let role = match headers.get(USER_ROLE_HEADER).and_then(|value| value.to_str().ok()) {
        Some(raw) => Role::parse(raw).ok_or(BookingError::Unauthenticated)?,
        None => Role::Customer,
    };
    Ok(Actor { user_id: UserId::new(user_id), role })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};

    fn token(claims: &Claims, secret: &str) -> String {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes()))
            .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token)).unwrap());
        headers
    }

    fn in_an_hour() -> usize {
        (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize
    }

    #[test]
    fn valid_token_yields_actor() {
        let claims = Claims { sub: "u-42".into(), role: Role::Admin, exp: in_an_hour() };
        let actor = actor_from_bearer(&bearer(&token(&claims, "s3cret")), "s3cret").unwrap();
        assert_eq!(actor, Actor::admin("u-42"));
    }

    #[test]
    fn wrong_secret_and_expiry_are_rejected() {
        let claims = Claims { sub: "u-42".into(), role: Role::Customer, exp: in_an_hour() };
        assert!(matches!(
            actor_from_bearer(&bearer(&token(&claims, "other")), "s3cret"),
            Err(BookingError::Unauthenticated)
        ));

        let expired = Claims { exp: 1_000, ..claims };
        assert!(actor_from_bearer(&bearer(&token(&expired, "s3cret")), "s3cret").is_err());
        assert!(actor_from_bearer(&HeaderMap::new(), "s3cret").is_err());
    }

    #[test]
    fn gateway_headers() {
        let mut headers = HeaderMap::new();
        assert!(actor_from_gateway(&headers).is_err());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-1"));
        assert_eq!(actor_from_gateway(&headers).unwrap(), Actor::customer("u-1"));

        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("admin"));
        assert!(actor_from_gateway(&headers).unwrap().is_privileged());

        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("root"));
        assert!(actor_from_gateway(&headers).is_err());
    }
}
