use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use super::{AppState, Notice};
use crate::auth::Actor;
use crate::error::{ApiError, FormErrors};
use crate::models::{Id, NewReport, Report, Target, UpvoteState};
use crate::moderation::{self, ReportOutcome, ReportTarget, ReportView};

#[derive(Debug, Serialize, ToSchema)]
pub struct Deleted {
    pub id: Id,
    /// Where the client should go next.
    pub redirect: String,
    pub notices: Vec<Notice>,
}

#[utoipa::path(
    post,
    path = "/delete/thread/{id}/",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread tombstoned", body = Deleted),
        (status = 403, description = "Not the author and no delete_any_thread"),
        (status = 404, description = "Unknown thread")
    )
)]
pub async fn delete_thread(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let thread = moderation::delete_thread(data.repo.as_ref(), &actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(Deleted {
        id: thread.id,
        redirect: "/".into(),
        notices: vec![Notice::success("Thread has been deleted!")],
    }))
}

#[utoipa::path(
    post,
    path = "/delete/reply/{id}/",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Reply tombstoned", body = Deleted),
        (status = 403, description = "Not the author and no delete_any_reply"),
        (status = 404, description = "Unknown reply")
    )
)]
pub async fn delete_reply(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let reply = moderation::delete_reply(data.repo.as_ref(), &actor, path.into_inner()).await?;
    let thread = data.repo.thread_summary(reply.thread_id).await?;
    Ok(HttpResponse::Ok().json(Deleted {
        id: reply.id,
        redirect: format!("/thread/{}/{}/", thread.category_slug, thread.thread.id),
        notices: vec![Notice::success("Reply has been deleted!")],
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LockState {
    pub id: Id,
    pub is_locked: bool,
}

#[utoipa::path(
    post,
    path = "/thread/{id}/toggle-lock/",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "New lock state", body = LockState),
        (status = 403, description = "Missing lock_thread"),
        (status = 404, description = "Unknown thread")
    )
)]
pub async fn toggle_lock(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let is_locked = moderation::toggle_thread_lock(data.repo.as_ref(), &actor, id).await?;
    Ok(HttpResponse::Ok().json(LockState { id, is_locked }))
}

async fn like(data: &AppState, actor: &Actor, target: Target, toggle: bool) -> Result<HttpResponse, ApiError> {
    let state: UpvoteState = if toggle {
        moderation::toggle_upvote(data.repo.as_ref(), actor, target).await?
    } else {
        moderation::upvote_state(data.repo.as_ref(), actor, target).await?
    };
    Ok(HttpResponse::Ok().json(state))
}

#[utoipa::path(
    post,
    path = "/thread/{id}/like/",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Upvote toggled", body = UpvoteState),
        (status = 404, description = "Unknown thread")
    )
)]
pub async fn toggle_thread_like(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(&data, &actor, Target::Thread(path.into_inner()), true).await
}

#[utoipa::path(
    get,
    path = "/thread/{id}/like/",
    params(("id" = Id, Path, description = "Thread id")),
    responses((status = 200, description = "Current upvote state", body = UpvoteState))
)]
pub async fn thread_like_state(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(&data, &actor, Target::Thread(path.into_inner()), false).await
}

#[utoipa::path(
    post,
    path = "/reply/{id}/like/",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Upvote toggled", body = UpvoteState),
        (status = 404, description = "Unknown reply")
    )
)]
pub async fn toggle_reply_like(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(&data, &actor, Target::Reply(path.into_inner()), true).await
}

#[utoipa::path(
    get,
    path = "/reply/{id}/like/",
    params(("id" = Id, Path, description = "Reply id")),
    responses((status = 200, description = "Current upvote state", body = UpvoteState))
)]
pub async fn reply_like_state(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    like(&data, &actor, Target::Reply(path.into_inner()), false).await
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportForm {
    pub object_type: String,
    pub object: ReportTarget,
    pub already_reported: bool,
}

async fn report_form(data: &AppState, actor: &Actor, target: Target) -> Result<HttpResponse, ApiError> {
    let object = moderation::resolve_target(data.repo.as_ref(), target).await?;
    let already_reported = moderation::already_reported(data.repo.as_ref(), actor, target).await?;
    Ok(HttpResponse::Ok().json(ReportForm { object_type: object.kind().into(), object, already_reported }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportFiled {
    pub report: Option<Report>,
    pub notices: Vec<Notice>,
}

async fn report_submit(
    data: &AppState,
    actor: &Actor,
    target: Target,
    form: NewReport,
) -> Result<HttpResponse, ApiError> {
    let object = moderation::resolve_target(data.repo.as_ref(), target).await?;
    let kind = object.kind();
    let duplicate = || {
        HttpResponse::Ok().json(ReportFiled {
            report: None,
            notices: vec![Notice::warning(format!("You have already reported this {kind}!"))],
        })
    };
    // the duplicate check wins over form validation
    if moderation::already_reported(data.repo.as_ref(), actor, target).await? {
        return Ok(duplicate());
    }
    if let Err(e) = form.validate() {
        let mut errors = FormErrors::new(&form);
        errors.merge(&e);
        return Err(ApiError::Validation(errors));
    }
    match moderation::file_report(data.repo.as_ref(), actor, &object, form).await? {
        ReportOutcome::Filed(report) => {
            let message = if object.reply.is_some() { "Reply has been reported!" } else { "Thread has been reported!" };
            Ok(HttpResponse::Created().json(ReportFiled { report: Some(report), notices: vec![Notice::success(message)] }))
        }
        ReportOutcome::AlreadyReported => Ok(duplicate()),
    }
}

#[utoipa::path(
    get,
    path = "/report/thread/{id}/",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Report form for the thread", body = ReportForm),
        (status = 404, description = "Unknown thread")
    )
)]
pub async fn report_thread_form(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    report_form(&data, &actor, Target::Thread(path.into_inner())).await
}

#[utoipa::path(
    post,
    path = "/report/thread/{id}/",
    params(("id" = Id, Path, description = "Thread id")),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = ReportFiled),
        (status = 200, description = "Already reported; warning notice only", body = ReportFiled),
        (status = 404, description = "Unknown thread"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn report_thread(
    actor: Actor,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    report_submit(&data, &actor, Target::Thread(path.into_inner()), payload.into_inner()).await
}

#[utoipa::path(
    get,
    path = "/report/reply/{id}/",
    params(("id" = Id, Path, description = "Reply id")),
    responses(
        (status = 200, description = "Report form for the reply", body = ReportForm),
        (status = 404, description = "Unknown reply")
    )
)]
pub async fn report_reply_form(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    report_form(&data, &actor, Target::Reply(path.into_inner())).await
}

#[utoipa::path(
    post,
    path = "/report/reply/{id}/",
    params(("id" = Id, Path, description = "Reply id")),
    request_body = NewReport,
    responses(
        (status = 201, description = "Report filed", body = ReportFiled),
        (status = 200, description = "Already reported; warning notice only", body = ReportFiled),
        (status = 404, description = "Unknown reply"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn report_reply(
    actor: Actor,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    report_submit(&data, &actor, Target::Reply(path.into_inner()), payload.into_inner()).await
}

#[utoipa::path(
    get,
    path = "/reports/",
    responses(
        (status = 200, description = "Open reports, newest first", body = [ReportView]),
        (status = 403, description = "Missing view_report_page")
    )
)]
pub async fn list_reports(actor: Actor, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(moderation::list_open_reports(data.repo.as_ref(), &actor).await?))
}

#[utoipa::path(
    post,
    path = "/reports/{id}/resolve/",
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report resolved (also when it already was)", body = Report),
        (status = 403, description = "Missing view_report_page"),
        (status = 404, description = "Unknown report")
    )
)]
pub async fn resolve_report(actor: Actor, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(moderation::resolve_report(data.repo.as_ref(), &actor, path.into_inner()).await?))
}
