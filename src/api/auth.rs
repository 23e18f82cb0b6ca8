//! Login tokens. A signed JWT naming the user travels in the `token` cookie.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use poem::http::StatusCode;
use poem::web::cookie::{Cookie, SameSite};
use poem::{FromRequest, Request, RequestBody};
use poem_openapi::auth::ApiKey;
use poem_openapi::error::AuthorizationError;
use poem_openapi::SecurityScheme;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TOKEN_COOKIE: &str = "token";
pub const TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub exp: usize,
}

pub fn jwt_secret() -> Option<String> {
    match std::env::var("JWT_SECRET_KEY") {
        Ok(key) if !key.is_empty() => Some(key),
        _ => None,
    }
}

pub fn is_production() -> bool {
    matches!(std::env::var("PREDDIT_ENV"), Ok(env) if env == "production")
}

pub fn create_token(username: &str, secret: &str) -> Result<String, anyhow::Error> {
    let claims = Claims {
        username: username.to_string(),
        exp: (Utc::now().timestamp() + TOKEN_LIFETIME_SECS) as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Check the signature and expiry of a token.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, anyhow::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

fn user_from_token(token: &str) -> Result<AuthUser, anyhow::Error> {
    let secret = match jwt_secret() {
        Some(secret) => secret,
        None => return Err(anyhow::anyhow!("JWT_SECRET_KEY is not set.")),
    };

    let claims = verify_token(token, &secret)?;
    Ok(AuthUser {
        username: claims.username,
    })
}

fn build_cookie(value: &str, max_age: Duration) -> String {
    let mut cookie = Cookie::new_with_str(TOKEN_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(max_age);
    cookie.set_secure(is_production());
    cookie.to_string()
}

/// The `Set-Cookie` value that hands a token to the browser.
pub fn token_cookie(token: &str) -> String {
    build_cookie(token, Duration::from_secs(TOKEN_LIFETIME_SECS as u64))
}

/// The `Set-Cookie` value that makes the browser drop the token.
pub fn expired_cookie() -> String {
    build_cookie("", Duration::from_secs(0))
}

/// Requires a valid token in the `token` cookie.
#[derive(SecurityScheme)]
#[oai(
    type = "api_key",
    key_name = "token",
    in = "cookie",
    checker = "token_checker"
)]
pub struct CustomSecurityScheme(pub AuthUser);

async fn token_checker(_: &Request, api_key: ApiKey) -> Option<AuthUser> {
    match user_from_token(&api_key.key) {
        Ok(user) => {
            debug!("current_user: {:?}", user);
            Some(user)
        }
        Err(e) => {
            warn!("Rejected token: {}", e);
            None
        }
    }
}

/// The logged in user if there is one. A bad token is treated as no token.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionalUser(pub Option<AuthUser>);

impl OptionalUser {
    pub fn username(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.username.as_str())
    }
}

#[poem::async_trait]
impl<'a> FromRequest<'a> for OptionalUser {
    async fn from_request(req: &'a Request, _body: &mut RequestBody) -> poem::Result<Self> {
        let token = match req.cookie().get(TOKEN_COOKIE) {
            Some(cookie) => cookie.value_str().to_string(),
            None => return Ok(OptionalUser(None)),
        };

        if token.is_empty() {
            return Ok(OptionalUser(None));
        }

        match user_from_token(&token) {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(e) => {
                warn!("Ignoring an invalid token on {}: {}", req.uri().path(), e);
                Ok(OptionalUser(None))
            }
        }
    }
}

/// Turns a failed security check into the JSON error the frontend expects.
pub async fn unauthenticated(_: AuthorizationError) -> poem::Response {
    poem::Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .content_type("application/json")
        .body(serde_json::json!({ "error": "Unauthenticated" }).to_string())
}
