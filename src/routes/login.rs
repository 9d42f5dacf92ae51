use actix_web::{http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::auth::{Actor, Auth, Permission, PermissionSet};
use crate::config::GoogleOAuth;
use crate::error::ApiError;
use crate::models::Id;

fn not_configured() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "error": "google_oauth_not_configured",
        "message": "Set GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET to enable login"
    }))
}

#[utoipa::path(
    get,
    path = "/auth/google/login",
    responses(
        (status = 302, description = "Redirect to the identity provider"),
        (status = 503, description = "Login not configured")
    )
)]
pub async fn google_login(data: web::Data<AppState>) -> HttpResponse {
    let Some(google) = data.settings.google.as_ref() else {
        return not_configured();
    };
    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&prompt=select_account",
        google.auth_url,
        urlencoding::encode(&google.client_id),
        urlencoding::encode(&google.redirect_uri),
        urlencoding::encode("openid email profile"),
    );
    HttpResponse::Found().insert_header((header::LOCATION, url)).finish()
}

#[derive(Deserialize)]
pub struct GoogleCallback {
    code: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUser {
    email: Option<String>,
    name: Option<String>,
}

async fn fetch_profile(google: &GoogleOAuth, code: &str) -> Result<GoogleUser, reqwest::Error> {
    let client = reqwest::Client::new();
    let token = client
        .post(&google.token_url)
        .form(&[
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", google.redirect_uri.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json::<TokenResponse>()
        .await?;
    client
        .get(&google.userinfo_url)
        .bearer_auth(&token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json::<GoogleUser>()
        .await
}

#[utoipa::path(
    get,
    path = "/auth/google/callback",
    params(("code" = String, Query, description = "Authorization code from the provider")),
    responses(
        (status = 302, description = "Redirect to the frontend with a session token"),
        (status = 403, description = "Email missing or outside the allowed domains"),
        (status = 503, description = "Login not configured")
    )
)]
pub async fn google_callback(
    query: web::Query<GoogleCallback>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let Some(google) = data.settings.google.as_ref() else {
        return Ok(not_configured());
    };
    let profile = fetch_profile(google, &query.code).await.map_err(|e| {
        tracing::warn!(error = %e, "google code exchange failed");
        ApiError::Unauthorized
    })?;

    let email = match data.gate.admit(profile.email.as_deref()) {
        Ok(email) => email,
        Err(e) => {
            tracing::info!(email = ?profile.email, reason = %e, "login refused");
            return Ok(HttpResponse::Forbidden().json(serde_json::json!({ "error": "forbidden", "message": e.to_string() })));
        }
    };
    let username = profile
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_owned());

    let mut user = data.repo.upsert_user(&email, &username).await?;
    let is_bootstrap_admin = data.settings.bootstrap_admins.iter().any(|a| a.eq_ignore_ascii_case(&email));
    if is_bootstrap_admin && PermissionSet::from_names(&user.permissions) != PermissionSet::all() {
        user = data.repo.set_permissions(user.id, &PermissionSet::all().names()).await?;
        tracing::info!(user_id = user.id, "bootstrap admin granted every capability");
    }

    let jwt = data
        .jwt
        .issue(&user, &PermissionSet::from_names(&user.permissions))
        .map_err(|_| ApiError::Internal)?;
    tracing::info!(user_id = user.id, "login");
    let frontend_url = data.settings.frontend_url.trim_end_matches('/');
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, format!("{}/?token={}", frontend_url, jwt)))
        .finish())
}

#[derive(Serialize, ToSchema)]
pub struct TokenBody {
    pub token: String,
}

/// Re-issues the session with capabilities reloaded from the store, so
/// grants and revocations apply without a new login.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Fresh session token", body = TokenBody),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn refresh_token(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()?).await.map_err(|_| ApiError::Unauthorized)?;
    let token = data
        .jwt
        .issue(&user, &PermissionSet::from_names(&user.permissions))
        .map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenBody { token }))
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub id: Id,
    pub email: String,
    pub name: String,
    pub permissions: Vec<Permission>,
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current session", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, actor: Actor) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(MeResponse {
        id: actor.user_id,
        email: auth.0.email,
        name: auth.0.name,
        permissions: actor.perms.to_vec(),
    }))
}
