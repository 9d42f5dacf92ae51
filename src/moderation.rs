//! Who may delete, lock, report and resolve, and what each action changes.
//!
//! Every operation receives the acting [`Actor`] explicitly. Capability checks
//! are plain has/has-not lookups; only the two delete actions let authors act
//! on their own content without a capability.

use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Actor, Permission};
use crate::listing::reply_page_index;
use crate::models::{Id, NewReport, Reply, Report, Target, Thread, UpvoteState};
use crate::repo::{Repo, RepoError, ReportDraft};

#[derive(thiserror::Error, Debug)]
pub enum ModerationError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ModerationError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ModerationError::NotFound,
            other => ModerationError::Repo(other),
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;

fn require(actor: &Actor, perm: Permission) -> ModerationResult<()> {
    if actor.can(perm) {
        Ok(())
    } else {
        tracing::info!(user_id = actor.user_id, permission = perm.as_str(), "capability missing");
        Err(ModerationError::Forbidden)
    }
}

/// Tombstones a thread. Replies stay as they are; they disappear with it.
pub async fn delete_thread(repo: &dyn Repo, actor: &Actor, thread_id: Id) -> ModerationResult<Thread> {
    let thread = repo.get_thread(thread_id).await?;
    if thread.author_id != Some(actor.user_id) {
        require(actor, Permission::DeleteAnyThread)?;
    }
    repo.mark_thread_deleted(thread.id).await?;
    tracing::info!(user_id = actor.user_id, thread_id, "thread deleted");
    Ok(Thread { is_deleted: true, ..thread })
}

pub async fn delete_reply(repo: &dyn Repo, actor: &Actor, reply_id: Id) -> ModerationResult<Reply> {
    let reply = repo.get_reply(reply_id).await?;
    if reply.author_id != Some(actor.user_id) {
        require(actor, Permission::DeleteAnyReply)?;
    }
    repo.mark_reply_deleted(reply.id).await?;
    tracing::info!(user_id = actor.user_id, reply_id, "reply deleted");
    Ok(Reply { is_deleted: true, ..reply })
}

/// Capability first, then lookup: callers without `lock_thread` learn
/// nothing about which ids exist.
pub async fn toggle_thread_lock(repo: &dyn Repo, actor: &Actor, thread_id: Id) -> ModerationResult<bool> {
    require(actor, Permission::LockThread)?;
    let locked = repo.toggle_thread_lock(thread_id).await?;
    tracing::info!(user_id = actor.user_id, thread_id, locked, "thread lock toggled");
    Ok(locked)
}

/// A report target resolved to its rows. A reply's report also records the
/// reply's thread.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportTarget {
    pub thread: Thread,
    pub reply: Option<Reply>,
}

impl ReportTarget {
    pub fn target(&self) -> Target {
        match &self.reply {
            Some(r) => Target::Reply(r.id),
            None => Target::Thread(self.thread.id),
        }
    }

    pub fn kind(&self) -> &'static str {
        if self.reply.is_some() { "reply" } else { "thread" }
    }
}

pub async fn resolve_target(repo: &dyn Repo, target: Target) -> ModerationResult<ReportTarget> {
    match target {
        Target::Thread(id) => Ok(ReportTarget { thread: repo.get_thread(id).await?, reply: None }),
        Target::Reply(id) => {
            let reply = repo.get_reply(id).await?;
            let thread = repo.get_thread(reply.thread_id).await?;
            Ok(ReportTarget { thread, reply: Some(reply) })
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Filed(Report),
    AlreadyReported,
}

pub async fn already_reported(repo: &dyn Repo, actor: &Actor, target: Target) -> ModerationResult<bool> {
    Ok(repo.has_reported(actor.user_id, target).await?)
}

/// Files a report unless the actor already has one, resolved or not, on
/// this exact target. A racing duplicate loses at the store's uniqueness
/// constraint and is reported the same way.
pub async fn file_report(
    repo: &dyn Repo,
    actor: &Actor,
    target: &ReportTarget,
    form: NewReport,
) -> ModerationResult<ReportOutcome> {
    if repo.has_reported(actor.user_id, target.target()).await? {
        return Ok(ReportOutcome::AlreadyReported);
    }
    let draft = ReportDraft {
        author_id: actor.user_id,
        thread_id: target.thread.id,
        reply_id: target.reply.as_ref().map(|r| r.id),
        reason: form.reason,
    };
    match repo.create_report(draft).await {
        Ok(report) => {
            tracing::info!(user_id = actor.user_id, report_id = report.id, kind = target.kind(), "report filed");
            Ok(ReportOutcome::Filed(report))
        }
        Err(RepoError::Conflict) => Ok(ReportOutcome::AlreadyReported),
        Err(e) => Err(e.into()),
    }
}

/// An open report plus, for reply reports, the page of the thread the reply
/// sits on.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: Report,
    pub reply_page: Option<i64>,
}

pub async fn list_open_reports(repo: &dyn Repo, actor: &Actor) -> ModerationResult<Vec<ReportView>> {
    require(actor, Permission::ViewReportPage)?;
    let reports = repo.list_open_reports().await?;
    let mut out = Vec::with_capacity(reports.len());
    for report in reports {
        let reply_page = match report.reply_id {
            Some(reply_id) => match repo.get_reply(reply_id).await {
                Ok(reply) => Some(reply_page_index(repo, &reply).await?),
                Err(RepoError::NotFound) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        out.push(ReportView { report, reply_page });
    }
    Ok(out)
}

/// Resolving an already resolved report succeeds and changes nothing.
pub async fn resolve_report(repo: &dyn Repo, actor: &Actor, report_id: Id) -> ModerationResult<Report> {
    require(actor, Permission::ViewReportPage)?;
    let report = repo.resolve_report(report_id).await?;
    tracing::info!(user_id = actor.user_id, report_id, "report resolved");
    Ok(report)
}

pub async fn toggle_upvote(repo: &dyn Repo, actor: &Actor, target: Target) -> ModerationResult<UpvoteState> {
    let state = repo.toggle_upvote(actor.user_id, target).await?;
    tracing::debug!(user_id = actor.user_id, ?target, liked = state.liked, "upvote toggled");
    Ok(state)
}

pub async fn upvote_state(repo: &dyn Repo, actor: &Actor, target: Target) -> ModerationResult<UpvoteState> {
    Ok(repo.upvote_state(actor.user_id, target).await?)
}
