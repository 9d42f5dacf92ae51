use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{AppState, Notice, ReplyView, ThreadView};
use crate::auth::Actor;
use crate::error::{ApiError, FormErrors};
use crate::listing::{reply_page_index, reply_page_map, ListParams, Order, Page, SortKey};
use crate::models::*;
use crate::repo::{RepoError, ReplyDraft, ThreadDraft};

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadListing {
    #[schema(value_type = Object)]
    pub threads: Page<ThreadView>,
    pub category: Option<Category>,
    pub sort: SortKey,
    pub order: Order,
    pub search: Option<String>,
}

async fn listing(
    data: &AppState,
    params: &ListParams,
    category: Option<Category>,
) -> Result<HttpResponse, ApiError> {
    let q = params.thread_query(category.as_ref().map(|c| c.slug.clone()));
    let page = data.repo.list_threads(&q).await?.map(ThreadView::from);
    Ok(HttpResponse::Ok().json(ThreadListing { threads: page, category, sort: q.sort, order: q.order, search: q.search }))
}

#[utoipa::path(
    get,
    path = "/",
    params(ListParams),
    responses(
        (status = 200, description = "One page of visible threads", body = ThreadListing),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_threads(
    _actor: Actor,
    data: web::Data<AppState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    listing(&data, &params, None).await
}

#[utoipa::path(
    get,
    path = "/categories/{slug}/",
    params(("slug" = String, Path, description = "Category slug"), ListParams),
    responses(
        (status = 200, description = "One page of visible threads in the category", body = ThreadListing),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn list_category_threads(
    _actor: Actor,
    data: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let category = data
        .repo
        .list_categories()
        .await?
        .into_iter()
        .find(|c| c.slug == slug)
        .ok_or(ApiError::NotFound)?;
    listing(&data, &params, Some(category)).await
}

#[utoipa::path(
    get,
    path = "/categories/",
    responses((status = 200, description = "All categories", body = [Category]))
)]
pub async fn list_categories(_actor: Actor, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_categories().await?))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadDetail {
    pub thread: ThreadView,
    pub tags: Vec<Tag>,
    pub upvotes: UpvoteState,
    #[schema(value_type = Object)]
    pub replies: Page<ReplyView>,
    /// Page of the default reply listing each visible reply sits on.
    pub reply_page_map: BTreeMap<Id, i64>,
}

/// Thread whose id and category slug both match the path.
async fn thread_in_category(data: &AppState, category: &str, id: Id) -> Result<ThreadSummary, ApiError> {
    let summary = data.repo.thread_summary(id).await?;
    if summary.category_slug != category {
        return Err(ApiError::NotFound);
    }
    Ok(summary)
}

#[utoipa::path(
    get,
    path = "/thread/{category}/{id}/",
    params(
        ("category" = String, Path, description = "Category slug"),
        ("id" = Id, Path, description = "Thread id"),
        ListParams
    ),
    responses(
        (status = 200, description = "Thread with one page of replies", body = ThreadDetail),
        (status = 403, description = "Thread was deleted"),
        (status = 404, description = "No such thread in this category")
    )
)]
pub async fn thread_detail(
    actor: Actor,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let (category, id) = path.into_inner();
    let summary = thread_in_category(&data, &category, id).await?;
    if summary.thread.is_deleted {
        return Err(ApiError::Forbidden);
    }
    let replies = data.repo.list_replies(id, &params.reply_query()).await?.map(ReplyView::from);
    let ids = data.repo.visible_reply_ids(id).await?;
    let detail = ThreadDetail {
        tags: data.repo.thread_tags(id).await?,
        upvotes: data.repo.upvote_state(actor.user_id, Target::Thread(id)).await?,
        thread: summary.into(),
        replies,
        reply_page_map: reply_page_map(&ids).into_iter().collect(),
    };
    Ok(HttpResponse::Ok().json(detail))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadFormOptions {
    pub courses: Vec<Course>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

#[utoipa::path(
    get,
    path = "/create_thread/",
    responses((status = 200, description = "Choices for the create-thread form", body = ThreadFormOptions))
)]
pub async fn create_thread_form(_actor: Actor, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(ThreadFormOptions {
        courses: data.repo.list_courses().await?,
        categories: data.repo.list_categories().await?,
        tags: data.repo.list_tags().await?,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadCreated {
    pub thread: ThreadView,
    pub notices: Vec<Notice>,
}

const INVALID_CHOICE: &str = "Select a valid choice.";

/// Missing rows a form points at become field errors rather than a 404.
async fn exists<T>(lookup: impl std::future::Future<Output = Result<T, RepoError>>) -> Result<Option<T>, ApiError> {
    match lookup.await {
        Ok(v) => Ok(Some(v)),
        Err(RepoError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/create_thread/",
    request_body = NewThread,
    responses(
        (status = 201, description = "Thread created; may carry a course mismatch warning", body = ThreadCreated),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_thread(
    actor: Actor,
    data: web::Data<AppState>,
    payload: web::Json<NewThread>,
) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    let mut errors = FormErrors::new(&form);
    if let Err(e) = form.validate() {
        errors.merge(&e);
    }

    if let Some(course_id) = form.course_id {
        if exists(data.repo.get_course(course_id)).await?.is_none() {
            errors.add("course_id", INVALID_CHOICE);
        }
    }
    let resource = match form.resource_id {
        Some(id) => {
            let found = exists(data.repo.get_resource(id)).await?;
            if found.is_none() {
                errors.add("resource_id", INVALID_CHOICE);
            }
            found
        }
        None => None,
    };
    let category = exists(data.repo.get_category(form.category_id)).await?;
    if category.is_none() {
        errors.add("category_id", INVALID_CHOICE);
    }
    let known_tags = data.repo.get_tags(&form.tag_ids).await?;
    if form.tag_ids.iter().any(|id| !known_tags.iter().any(|t| t.id == *id)) {
        errors.add("tag_ids", INVALID_CHOICE);
    }
    errors.into_result()?;

    let mut notices = Vec::new();
    if let Some(res) = &resource {
        if form.course_id != Some(res.course_id) {
            notices.push(Notice::warning("The resource should be of the same course!"));
        }
    }

    let thread = data
        .repo
        .create_thread(ThreadDraft {
            title: form.title.trim().to_owned(),
            course_id: form.course_id,
            resource_id: form.resource_id,
            author_id: actor.user_id,
            content: form.content,
            category_id: form.category_id,
            tag_ids: form.tag_ids,
        })
        .await?;
    tracing::info!(user_id = actor.user_id, thread_id = thread.id, "thread created");
    notices.push(Notice::success("Your thread has been created!"));

    let summary = data.repo.thread_summary(thread.id).await?;
    Ok(HttpResponse::Created().json(ThreadCreated { thread: summary.into(), notices }))
}

#[derive(Debug, Deserialize)]
pub struct ReplyPath {
    category: String,
    id: Id,
    #[serde(default)]
    parent_id: Option<Id>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReplyCreated {
    pub reply: ReplyView,
    /// Page of the thread's default reply listing the new reply is on.
    pub page: i64,
    pub notices: Vec<Notice>,
}

#[utoipa::path(
    post,
    path = "/thread/{category}/{id}/reply/{parent_id}/",
    params(
        ("category" = String, Path, description = "Category slug"),
        ("id" = Id, Path, description = "Thread id"),
        ("parent_id" = Option<Id>, Path, description = "Reply being answered; omit the segment for a top-level reply")
    ),
    request_body = NewReply,
    responses(
        (status = 201, description = "Reply created", body = ReplyCreated),
        (status = 403, description = "Thread is locked or deleted"),
        (status = 404, description = "Unknown thread, or parent not in this thread"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_reply(
    actor: Actor,
    data: web::Data<AppState>,
    path: web::Path<ReplyPath>,
    payload: web::Json<NewReply>,
) -> Result<HttpResponse, ApiError> {
    let ReplyPath { category, id, parent_id } = path.into_inner();
    let summary = thread_in_category(&data, &category, id).await?;
    let parent = match parent_id {
        Some(pid) => {
            let parent = data.repo.get_reply(pid).await?;
            if parent.thread_id != id {
                return Err(ApiError::NotFound);
            }
            Some(parent)
        }
        None => None,
    };
    if summary.thread.is_deleted || summary.thread.is_locked {
        return Err(ApiError::Forbidden);
    }

    let form = payload.into_inner();
    if let Err(e) = form.validate() {
        let mut errors = FormErrors::new(&form);
        errors.merge(&e);
        return Err(ApiError::Validation(errors));
    }

    let reply = data
        .repo
        .create_reply(ReplyDraft { thread_id: id, parent_id, author_id: actor.user_id, content: form.content })
        .await?;
    tracing::info!(user_id = actor.user_id, thread_id = id, reply_id = reply.id, "reply created");

    // detached; the response never waits on mail delivery
    let _ = data.notifier.reply_created(
        data.repo.clone(),
        &summary.thread,
        &summary.category_slug,
        parent.as_ref(),
        &reply,
    );

    let page = reply_page_index(data.repo.as_ref(), &reply).await?;
    let view = ReplyView::from(ReplySummary {
        author_name: Some(actor_name(&data, actor.user_id).await),
        upvote_count: 0,
        reply,
    });
    Ok(HttpResponse::Created().json(ReplyCreated {
        reply: view,
        page,
        notices: vec![Notice::success("Your reply has been created!")],
    }))
}

async fn actor_name(data: &AppState, user_id: Id) -> String {
    data.repo.get_user(user_id).await.map(|u| u.username).unwrap_or_default()
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResourceQuery {
    /// Course whose resources to list
    course_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ajax/resources/",
    params(ResourceQuery),
    responses((status = 200, description = "Resources of the course; empty when the course id is missing or invalid", body = [ResourceOption]))
)]
pub async fn ajax_resources(
    _actor: Actor,
    data: web::Data<AppState>,
    query: web::Query<ResourceQuery>,
) -> Result<HttpResponse, ApiError> {
    let Some(course_id) = query.course_id.as_deref().and_then(|v| v.trim().parse::<Id>().ok()) else {
        return Ok(HttpResponse::Ok().json(Vec::<ResourceOption>::new()));
    };
    Ok(HttpResponse::Ok().json(data.repo.list_resources_for_course(course_id).await?))
}
