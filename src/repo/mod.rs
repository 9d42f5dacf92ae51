use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::listing::{Page, ReplyQuery, ThreadQuery};
use crate::models::*;

pub mod inmem;
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            // unique_violation / foreign_key_violation
            sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("23505" | "23503")) => {
                RepoError::Conflict
            }
            _ => {
                tracing::error!(error = %e, "database error");
                RepoError::Internal(e.to_string())
            }
        }
    }
}

/// Validated create-thread form plus its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDraft {
    pub title: String,
    pub course_id: Option<Id>,
    pub resource_id: Option<Id>,
    pub author_id: Id,
    pub content: String,
    pub category_id: Id,
    pub tag_ids: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub thread_id: Id,
    pub parent_id: Option<Id>,
    pub author_id: Id,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDraft {
    pub author_id: Id,
    pub thread_id: Id,
    pub reply_id: Option<Id>,
    pub reason: String,
}

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn list_courses(&self) -> RepoResult<Vec<Course>>;
    async fn get_course(&self, id: Id) -> RepoResult<Course>;
    async fn create_course(&self, new: NewCourse) -> RepoResult<Course>;
    async fn get_resource(&self, id: Id) -> RepoResult<Resource>;
    async fn create_resource(&self, new: NewResource) -> RepoResult<Resource>;
    async fn list_resources_for_course(&self, course_id: Id) -> RepoResult<Vec<ResourceOption>>;
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn create_category(&self, new: NewLabel) -> RepoResult<Category>;
    /// `Conflict` while any thread still references the category.
    async fn delete_category(&self, slug: &str) -> RepoResult<()>;
    async fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    async fn create_tag(&self, new: NewLabel) -> RepoResult<Tag>;
    /// Existing tags among `ids`; unknown ids are simply absent.
    async fn get_tags(&self, ids: &[Id]) -> RepoResult<Vec<Tag>>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn list_threads(&self, q: &ThreadQuery) -> RepoResult<Page<ThreadSummary>>;
    /// Any thread, tombstoned or not.
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn thread_summary(&self, id: Id) -> RepoResult<ThreadSummary>;
    async fn thread_tags(&self, id: Id) -> RepoResult<Vec<Tag>>;
    async fn create_thread(&self, draft: ThreadDraft) -> RepoResult<Thread>;
    async fn mark_thread_deleted(&self, id: Id) -> RepoResult<()>;
    /// Flips `is_locked` in one step and returns the new value.
    async fn toggle_thread_lock(&self, id: Id) -> RepoResult<bool>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    async fn list_replies(&self, thread_id: Id, q: &ReplyQuery) -> RepoResult<Page<ReplySummary>>;
    /// Visible reply ids of a thread in default order (oldest first).
    async fn visible_reply_ids(&self, thread_id: Id) -> RepoResult<Vec<Id>>;
    async fn get_reply(&self, id: Id) -> RepoResult<Reply>;
    async fn create_reply(&self, draft: ReplyDraft) -> RepoResult<Reply>;
    async fn mark_reply_deleted(&self, id: Id) -> RepoResult<()>;
    /// Visible replies of `reply`'s thread ordered before it by `(created_at, id)`.
    async fn count_visible_replies_before(&self, reply: &Reply) -> RepoResult<i64>;
}

#[async_trait]
pub trait UpvoteRepo: Send + Sync {
    /// Removes the user's upvote if present, adds it otherwise.
    async fn toggle_upvote(&self, user_id: Id, target: Target) -> RepoResult<UpvoteState>;
    async fn upvote_state(&self, user_id: Id, target: Target) -> RepoResult<UpvoteState>;
}

#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// Resolved reports count too.
    async fn has_reported(&self, author_id: Id, target: Target) -> RepoResult<bool>;
    /// `Conflict` when the author already reported this exact target.
    async fn create_report(&self, draft: ReportDraft) -> RepoResult<Report>;
    /// Unresolved reports, newest first.
    async fn list_open_reports(&self) -> RepoResult<Vec<Report>>;
    async fn resolve_report(&self, id: Id) -> RepoResult<Report>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Finds the user by email, creating it on first login.
    async fn upsert_user(&self, email: &str, username: &str) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn set_permissions(&self, id: Id, permissions: &[String]) -> RepoResult<User>;
}

pub trait Repo: CatalogRepo + ThreadRepo + ReplyRepo + UpvoteRepo + ReportRepo + UserRepo {}

impl<T> Repo for T where T: CatalogRepo + ThreadRepo + ReplyRepo + UpvoteRepo + ReportRepo + UserRepo {}
