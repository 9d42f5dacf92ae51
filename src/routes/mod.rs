use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::JwtKeys;
use crate::config::Settings;
use crate::error::ApiErrorBody;
use crate::identity::IdentityGate;
use crate::models::{ReplySummary, ThreadSummary};
use crate::notify::{Mailer, Notifier};
use crate::render::markdown_to_html;
use crate::repo::Repo;

pub mod admin;
pub mod forum;
pub mod login;
pub mod moderate;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub notifier: Notifier,
    pub jwt: JwtKeys,
    pub gate: IdentityGate,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, mailer: Arc<dyn Mailer>, settings: Settings) -> Self {
        Self {
            repo,
            notifier: Notifier::new(mailer, &settings.site_url),
            jwt: JwtKeys::new(&settings.jwt_secret, settings.jwt_ttl_hours),
            gate: IdentityGate::new(&settings.allowed_domains),
            settings: Arc::new(settings),
        }
    }
}

/// Routes are matched in registration order, so the fixed `/thread/{id}/...`
/// actions must come before `/thread/{category}/{id}/`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(strict("/").route(web::get().to(forum::list_threads)))
        .service(strict("/categories/").route(web::get().to(forum::list_categories)))
        .service(strict("/categories/{slug}/").route(web::get().to(forum::list_category_threads)))
        .service(strict("/thread/{id}/toggle-lock/").route(web::post().to(moderate::toggle_lock)))
        .service(
            strict("/thread/{id}/like/")
                .route(web::get().to(moderate::thread_like_state))
                .route(web::post().to(moderate::toggle_thread_like)),
        )
        .service(
            strict("/reply/{id}/like/")
                .route(web::get().to(moderate::reply_like_state))
                .route(web::post().to(moderate::toggle_reply_like)),
        )
        .service(strict("/thread/{category}/{id}/").route(web::get().to(forum::thread_detail)))
        .service(strict("/thread/{category}/{id}/reply/").route(web::post().to(forum::create_reply)))
        .service(strict("/thread/{category}/{id}/reply/{parent_id}/").route(web::post().to(forum::create_reply)))
        .service(
            strict("/create_thread/")
                .route(web::get().to(forum::create_thread_form))
                .route(web::post().to(forum::create_thread)),
        )
        .service(strict("/ajax/resources/").route(web::get().to(forum::ajax_resources)))
        .service(strict("/delete/thread/{id}/").route(web::post().to(moderate::delete_thread)))
        .service(strict("/delete/reply/{id}/").route(web::post().to(moderate::delete_reply)))
        .service(
            strict("/report/thread/{id}/")
                .route(web::get().to(moderate::report_thread_form))
                .route(web::post().to(moderate::report_thread)),
        )
        .service(
            strict("/report/reply/{id}/")
                .route(web::get().to(moderate::report_reply_form))
                .route(web::post().to(moderate::report_reply)),
        )
        .service(strict("/reports/").route(web::get().to(moderate::list_reports)))
        .service(strict("/reports/{id}/resolve/").route(web::post().to(moderate::resolve_report)))
        .service(
            web::scope("/auth")
                .route("/google/login", web::get().to(login::google_login))
                .route("/google/callback", web::get().to(login::google_callback))
                .route("/refresh", web::post().to(login::refresh_token))
                .route("/me", web::get().to(login::auth_me)),
        )
        .service(
            web::scope("/admin")
                .service(strict("/courses/").route(web::post().to(admin::create_course)))
                .service(strict("/resources/").route(web::post().to(admin::create_resource)))
                .service(strict("/categories/").route(web::post().to(admin::create_category)))
                .service(
                    strict("/categories/{slug}/").route(web::delete().to(admin::delete_category)),
                )
                .service(strict("/tags/").route(web::post().to(admin::create_tag)))
                .service(
                    strict("/users/{id}/permissions/").route(web::put().to(admin::set_permissions)),
                ),
        );
}

// A wrong verb on a known path is Forbidden, not 405.
fn strict(path: &str) -> actix_web::Resource {
    web::resource(path).default_service(web::to(method_forbidden))
}

async fn method_forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(ApiErrorBody { error: "forbidden".into() })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
}

/// User-facing flash message. Duplicate actions answer 200 with a warning
/// notice instead of an error status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThreadView {
    #[serde(flatten)]
    pub summary: ThreadSummary,
    pub content_html: String,
}

impl From<ThreadSummary> for ThreadView {
    fn from(summary: ThreadSummary) -> Self {
        let content_html = markdown_to_html(&summary.thread.content);
        Self { summary, content_html }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReplyView {
    #[serde(flatten)]
    pub summary: ReplySummary,
    pub content_html: String,
}

impl From<ReplySummary> for ReplyView {
    fn from(summary: ReplySummary) -> Self {
        let content_html = markdown_to_html(&summary.reply.content);
        Self { summary, content_html }
    }
}
