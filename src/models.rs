use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

pub type Id = i64;

/// Lowercase words joined by single hyphens: `exam-prep`, `cs101`.
pub static SLUG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern compiles"));

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Course {
    pub id: Id,
    pub code: String,
    pub title: String,
    pub department: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewCourse {
    #[validate(length(min = 1, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub department: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "resource_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Video,
    Link,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Resource {
    pub id: Id,
    pub course_id: Id,
    pub title: String,
    pub kind: ResourceKind,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewResource {
    pub course_id: Id,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub kind: ResourceKind,
    #[validate(url(message = "Enter a valid URL."))]
    pub link: String,
}

/// Row shape of `GET /ajax/resources/`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ResourceOption {
    pub id: Id,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub slug: String,
}

/// Payload shared by tags and categories; both are a unique name + slug.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewLabel {
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    #[validate(length(min = 1, max = 40), regex(path = *SLUG_REGEX, message = "Use lowercase letters, digits and single hyphens."))]
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Thread {
    pub id: Id,
    pub title: String,
    pub course_id: Option<Id>,
    pub resource_id: Option<Id>,
    pub author_id: Option<Id>, // NULL once the author account is gone
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_locked: bool,
    pub is_deleted: bool,
    pub category_id: Id,
}

/// Create-thread form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewThread {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters."),
        custom(function = "not_blank")
    )]
    pub title: String,
    pub course_id: Option<Id>,
    pub resource_id: Option<Id>,
    pub category_id: Id,
    #[serde(default)]
    pub tag_ids: Vec<Id>,
    #[validate(custom(function = "not_blank"))]
    pub content: String,
}

/// Thread row as the listing sees it: joined category slug, author name and upvote count.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ThreadSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub thread: Thread,
    pub category_slug: String,
    pub author_name: Option<String>,
    pub upvote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Reply {
    pub id: Id,
    pub thread_id: Id,
    pub parent_id: Option<Id>, // weak reference into the same thread
    pub author_id: Option<Id>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewReply {
    #[validate(custom(function = "not_blank"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ReplySummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reply: Reply,
    pub author_name: Option<String>,
    pub upvote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Report {
    pub id: Id,
    pub author_id: Option<Id>,
    pub thread_id: Id,
    pub reply_id: Option<Id>, // set => report is about this reply within thread_id
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewReport {
    #[validate(custom(function = "not_blank"))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub permissions: Vec<String>,
}

/// What an upvote or report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    Thread(Id),
    Reply(Id),
}

impl Target {
    pub fn id(&self) -> Id {
        match self {
            Target::Thread(id) | Target::Reply(id) => *id,
        }
    }
}

/// Result of an upvote toggle or read: the caller's state plus the current total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpvoteState {
    pub upvote_count: i64,
    pub liked: bool,
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("This field is required.".into());
        return Err(err);
    }
    Ok(())
}
