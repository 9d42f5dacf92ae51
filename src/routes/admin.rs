//! Catalog and capability administration.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::AppState;
use crate::auth::{Actor, Permission, PermissionSet};
use crate::error::{ApiError, FormErrors};
use crate::models::*;
use crate::repo::RepoError;
use crate::require_perm;

fn validated<T: Validate + Serialize>(form: &T) -> Result<(), ApiError> {
    let mut errors = FormErrors::new(form);
    if let Err(e) = form.validate() {
        errors.merge(&e);
    }
    errors.into_result()
}

/// Unique name/slug clashes come back as a field error on the form.
fn label_conflict(form: &NewLabel, what: &str) -> ApiError {
    let mut errors = FormErrors::new(form);
    errors.add("slug", format!("A {what} with this name or slug already exists."));
    ApiError::Validation(errors)
}

#[utoipa::path(
    post,
    path = "/admin/courses/",
    request_body = NewCourse,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 403, description = "Missing manage_catalog"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_course(actor: Actor, data: web::Data<AppState>, payload: web::Json<NewCourse>) -> Result<HttpResponse, ApiError> {
    require_perm!(actor, Permission::ManageCatalog);
    validated(&*payload)?;
    let course = data.repo.create_course(payload.into_inner()).await?;
    tracing::info!(user_id = actor.user_id, course_id = course.id, "course created");
    Ok(HttpResponse::Created().json(course))
}

#[utoipa::path(
    post,
    path = "/admin/resources/",
    request_body = NewResource,
    responses(
        (status = 201, description = "Resource created", body = Resource),
        (status = 403, description = "Missing manage_catalog"),
        (status = 422, description = "Validation failed or unknown course")
    )
)]
pub async fn create_resource(actor: Actor, data: web::Data<AppState>, payload: web::Json<NewResource>) -> Result<HttpResponse, ApiError> {
    require_perm!(actor, Permission::ManageCatalog);
    validated(&*payload)?;
    let form = payload.into_inner();
    let values = FormErrors::new(&form);
    match data.repo.create_resource(form).await {
        Ok(resource) => {
            tracing::info!(user_id = actor.user_id, resource_id = resource.id, "resource created");
            Ok(HttpResponse::Created().json(resource))
        }
        Err(RepoError::NotFound) => {
            let mut errors = values;
            errors.add("course_id", "Select a valid choice.");
            Err(ApiError::Validation(errors))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/categories/",
    request_body = NewLabel,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Missing manage_catalog"),
        (status = 422, description = "Validation failed or name/slug taken")
    )
)]
pub async fn create_category(actor: Actor, data: web::Data<AppState>, payload: web::Json<NewLabel>) -> Result<HttpResponse, ApiError> {
    require_perm!(actor, Permission::ManageCatalog);
    validated(&*payload)?;
    match data.repo.create_category((*payload).clone()).await {
        Ok(category) => Ok(HttpResponse::Created().json(category)),
        Err(RepoError::Conflict) => Err(label_conflict(&payload, "category")),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/categories/{slug}/",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Category removed"),
        (status = 403, description = "Missing manage_catalog"),
        (status = 404, description = "Unknown category"),
        (status = 409, description = "Threads still use the category")
    )
)]
pub async fn delete_category(actor: Actor, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    require_perm!(actor, Permission::ManageCatalog);
    let slug = path.into_inner();
    data.repo.delete_category(&slug).await?;
    tracing::info!(user_id = actor.user_id, slug = %slug, "category deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/admin/tags/",
    request_body = NewLabel,
    responses(
        (status = 201, description = "Tag created", body = Tag),
        (status = 403, description = "Missing manage_catalog"),
        (status = 422, description = "Validation failed or name/slug taken")
    )
)]
pub async fn create_tag(actor: Actor, data: web::Data<AppState>, payload: web::Json<NewLabel>) -> Result<HttpResponse, ApiError> {
    require_perm!(actor, Permission::ManageCatalog);
    validated(&*payload)?;
    match data.repo.create_tag((*payload).clone()).await {
        Ok(tag) => Ok(HttpResponse::Created().json(tag)),
        Err(RepoError::Conflict) => Err(label_conflict(&payload, "tag")),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPermissionsRequest {
    pub permissions: Vec<Permission>,
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}/permissions/",
    params(("id" = Id, Path, description = "User id")),
    request_body = SetPermissionsRequest,
    responses(
        (status = 200, description = "Capabilities replaced; effective from the user's next token", body = User),
        (status = 403, description = "Missing manage_permissions"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn set_permissions(
    actor: Actor,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SetPermissionsRequest>,
) -> Result<HttpResponse, ApiError> {
    require_perm!(actor, Permission::ManagePermissions);
    let user_id = path.into_inner();
    let perms: PermissionSet = payload.into_inner().permissions.into_iter().collect();
    let user = data.repo.set_permissions(user_id, &perms.names()).await?;
    tracing::info!(user_id = actor.user_id, target_user = user_id, permissions = ?perms.names(), "permissions replaced");
    Ok(HttpResponse::Ok().json(user))
}
