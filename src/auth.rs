use std::collections::BTreeSet;
use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{Id, User};
use crate::repo::RepoError;
use crate::routes::AppState;

/// Named capability a moderator can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    LockThread,
    DeleteAnyThread,
    DeleteAnyReply,
    ViewReportPage,
    ManageCatalog,
    ManagePermissions,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::LockThread,
        Permission::DeleteAnyThread,
        Permission::DeleteAnyReply,
        Permission::ViewReportPage,
        Permission::ManageCatalog,
        Permission::ManagePermissions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::LockThread => "lock_thread",
            Permission::DeleteAnyThread => "delete_any_thread",
            Permission::DeleteAnyReply => "delete_any_reply",
            Permission::ViewReportPage => "view_report_page",
            Permission::ManageCatalog => "manage_catalog",
            Permission::ManagePermissions => "manage_permissions",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn all() -> Self {
        Permission::ALL.into_iter().collect()
    }

    pub fn has(&self, p: Permission) -> bool {
        self.0.contains(&p)
    }

    /// Stored names that no longer map to a capability are ignored.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names.iter().filter_map(|n| Permission::parse(n.as_ref())).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_owned()).collect()
    }

    pub fn to_vec(&self) -> Vec<Permission> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Who is acting and what they may do. Moderation operations take this
/// explicitly rather than reading request state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Id,
    pub perms: PermissionSet,
}

impl Actor {
    pub fn new(user_id: Id, perms: impl IntoIterator<Item = Permission>) -> Self {
        Self { user_id, perms: perms.into_iter().collect() }
    }

    pub fn can(&self, p: Permission) -> bool {
        self.perms.has(p)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub perms: Vec<Permission>,
    pub exp: usize,
}

/// HS256 signing material shared by the login handlers and the extractor.
#[derive(Clone)]
pub struct JwtKeys {
    secret: Arc<str>,
    ttl_hours: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self { secret: Arc::from(secret), ttl_hours }
    }

    pub fn issue(&self, user: &User, perms: &PermissionSet) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(self.ttl_hours)).timestamp().max(0) as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.username.clone(),
            perms: perms.to_vec(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)?;
        Ok(data.claims)
    }
}

/// Extractor yielding validated `Claims`. The token proves identity only;
/// capabilities come from [`Actor`].
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Result<Id, ApiError> {
        self.0.sub.parse::<Id>().map_err(|_| ApiError::Unauthorized)
    }
}

fn authenticate(req: &HttpRequest, pl: &mut Payload) -> Result<Auth, ApiError> {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        tracing::error!("AppState missing from app data");
        return Err(ApiError::Internal);
    };
    let bearer = BearerAuth::from_request(req, pl)
        .into_inner()
        .map_err(|_| ApiError::Unauthorized)?;
    state.jwt.verify(bearer.token()).map(Auth).map_err(|_| ApiError::Unauthorized)
}

impl FromRequest for Auth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        ready(authenticate(req, pl).map_err(Into::into))
    }
}

/// Loads the caller's current capabilities from the store, so a grant or
/// revocation applies to the very next request.
async fn load_actor(state: web::Data<AppState>, user_id: Id) -> Result<Actor, ApiError> {
    let user = state.repo.get_user(user_id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::Unauthorized,
        other => other.into(),
    })?;
    Ok(Actor { user_id, perms: PermissionSet::from_names(&user.permissions) })
}

impl FromRequest for Actor {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let identity = authenticate(req, pl).and_then(|auth| auth.user_id());
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let user_id = identity?;
            let state = state.ok_or(ApiError::Internal)?;
            Ok(load_actor(state, user_id).await?)
        })
    }
}

/// Capability guard for handlers returning `Result<_, ApiError>`.
#[macro_export]
macro_rules! require_perm {
    ($actor:expr, $perm:expr) => {
        if !$actor.can($perm) {
            return Err($crate::error::ApiError::Forbidden);
        }
    };
}
