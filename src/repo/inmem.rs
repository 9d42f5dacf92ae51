use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::*;
use crate::listing::{rank_replies, rank_threads, Page, ReplyQuery, ThreadQuery};

#[derive(Default, Serialize, Deserialize)]
struct State {
    users: HashMap<Id, User>,
    courses: HashMap<Id, Course>,
    resources: HashMap<Id, Resource>,
    categories: HashMap<Id, Category>,
    tags: HashMap<Id, Tag>,
    threads: HashMap<Id, Thread>,
    thread_tags: HashMap<Id, Vec<Id>>,
    replies: HashMap<Id, Reply>,
    thread_upvotes: HashSet<(Id, Id)>, // (user, thread)
    reply_upvotes: HashSet<(Id, Id)>,  // (user, reply)
    reports: HashMap<Id, Report>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn author_name(&self, author: Option<Id>) -> Option<String> {
        author.and_then(|id| self.users.get(&id)).map(|u| u.username.clone())
    }

    fn upvotes(&self, target: Target) -> (&HashSet<(Id, Id)>, Id) {
        match target {
            Target::Thread(id) => (&self.thread_upvotes, id),
            Target::Reply(id) => (&self.reply_upvotes, id),
        }
    }

    fn upvote_count(&self, target: Target) -> i64 {
        let (set, id) = self.upvotes(target);
        set.iter().filter(|(_, t)| *t == id).count() as i64
    }

    fn target_exists(&self, target: Target) -> bool {
        match target {
            Target::Thread(id) => self.threads.contains_key(&id),
            Target::Reply(id) => self.replies.contains_key(&id),
        }
    }

    fn summarize_thread(&self, t: &Thread) -> ThreadSummary {
        ThreadSummary {
            thread: t.clone(),
            category_slug: self
                .categories
                .get(&t.category_id)
                .map(|c| c.slug.clone())
                .unwrap_or_default(),
            author_name: self.author_name(t.author_id),
            upvote_count: self.upvote_count(Target::Thread(t.id)),
        }
    }

    fn summarize_reply(&self, r: &Reply) -> ReplySummary {
        ReplySummary {
            reply: r.clone(),
            author_name: self.author_name(r.author_id),
            upvote_count: self.upvote_count(Target::Reply(r.id)),
        }
    }

    fn state_of(&self, user_id: Id, target: Target) -> UpvoteState {
        let (set, id) = self.upvotes(target);
        UpvoteState { upvote_count: self.upvote_count(target), liked: set.contains(&(user_id, id)) }
    }

    fn label_taken<'a>(mut labels: impl Iterator<Item = (&'a String, &'a String)>, new: &NewLabel) -> bool {
        labels.any(|(name, slug)| *name == new.name || *slug == new.slug)
    }
}

/// Process-local store. Every write happens under one lock, which gives the
/// same per-row atomicity the Postgres constraints provide. When a snapshot
/// path is set the whole state is written as JSON after each change.
#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `<dir>/state.json` when present and keeps it up to date.
    pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join("state.json");
        let state = Self::load_state_from(&path);
        Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    tracing::info!(path = %path.display(), "loaded snapshot");
                    s
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable snapshot, starting empty");
                    State::default()
                }
            },
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "no snapshot, starting empty");
                State::default()
            }
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Called with the write guard still held, so snapshots land in the
    /// same order as the changes they record.
    fn persist(&self, s: &State) {
        let Some(path) = self.snapshot_path.as_deref() else { return };
        let bytes = match serde_json::to_vec_pretty(s) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialise snapshot");
                return;
            }
        };
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::error!(dir = %dir.display(), error = %e, "failed to create snapshot dir");
            }
        }
        // a crash mid-write leaves the previous snapshot intact
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path)) {
            tracing::error!(path = %path.display(), error = %e, "failed to write snapshot");
        }
    }
}

#[async_trait]
impl CatalogRepo for InMemRepo {
    async fn list_courses(&self) -> RepoResult<Vec<Course>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.courses.values().cloned().collect();
        v.sort_by(|a, b| a.code.cmp(&b.code).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_course(&self, id: Id) -> RepoResult<Course> {
        self.read()?.courses.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_course(&self, new: NewCourse) -> RepoResult<Course> {
        let mut s = self.write()?;
        let id = s.next_id();
        let course = Course { id, code: new.code, title: new.title, department: new.department };
        s.courses.insert(id, course.clone());
        self.persist(&s);
        Ok(course)
    }

    async fn get_resource(&self, id: Id) -> RepoResult<Resource> {
        self.read()?.resources.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_resource(&self, new: NewResource) -> RepoResult<Resource> {
        let mut s = self.write()?;
        if !s.courses.contains_key(&new.course_id) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let res = Resource { id, course_id: new.course_id, title: new.title, kind: new.kind, link: new.link };
        s.resources.insert(id, res.clone());
        self.persist(&s);
        Ok(res)
    }

    async fn list_resources_for_course(&self, course_id: Id) -> RepoResult<Vec<ResourceOption>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .resources
            .values()
            .filter(|r| r.course_id == course_id)
            .map(|r| ResourceOption { id: r.id, title: r.title.clone() })
            .collect();
        v.sort_by_key(|r| r.id);
        Ok(v)
    }

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.categories.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        self.read()?.categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_category(&self, new: NewLabel) -> RepoResult<Category> {
        let mut s = self.write()?;
        if State::label_taken(s.categories.values().map(|c| (&c.name, &c.slug)), &new) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let cat = Category { id, name: new.name, slug: new.slug };
        s.categories.insert(id, cat.clone());
        self.persist(&s);
        Ok(cat)
    }

    async fn delete_category(&self, slug: &str) -> RepoResult<()> {
        let mut s = self.write()?;
        let id = s
            .categories
            .values()
            .find(|c| c.slug == slug)
            .map(|c| c.id)
            .ok_or(RepoError::NotFound)?;
        if s.threads.values().any(|t| t.category_id == id) {
            return Err(RepoError::Conflict);
        }
        s.categories.remove(&id);
        self.persist(&s);
        Ok(())
    }

    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.tags.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_tag(&self, new: NewLabel) -> RepoResult<Tag> {
        let mut s = self.write()?;
        if State::label_taken(s.tags.values().map(|t| (&t.name, &t.slug)), &new) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let tag = Tag { id, name: new.name, slug: new.slug };
        s.tags.insert(id, tag.clone());
        self.persist(&s);
        Ok(tag)
    }

    async fn get_tags(&self, ids: &[Id]) -> RepoResult<Vec<Tag>> {
        let s = self.read()?;
        let mut v: Vec<_> = ids.iter().filter_map(|id| s.tags.get(id)).cloned().collect();
        v.sort_by_key(|t| t.id);
        v.dedup_by_key(|t| t.id);
        Ok(v)
    }
}

#[async_trait]
impl ThreadRepo for InMemRepo {
    async fn list_threads(&self, q: &ThreadQuery) -> RepoResult<Page<ThreadSummary>> {
        let s = self.read()?;
        let rows = s.threads.values().map(|t| s.summarize_thread(t)).collect();
        Ok(Page::paginate(rank_threads(rows, q), q.page))
    }

    async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
        self.read()?.threads.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn thread_summary(&self, id: Id) -> RepoResult<ThreadSummary> {
        let s = self.read()?;
        let t = s.threads.get(&id).ok_or(RepoError::NotFound)?;
        Ok(s.summarize_thread(t))
    }

    async fn thread_tags(&self, id: Id) -> RepoResult<Vec<Tag>> {
        let s = self.read()?;
        let ids = s.thread_tags.get(&id).cloned().unwrap_or_default();
        let mut v: Vec<_> = ids.iter().filter_map(|t| s.tags.get(t)).cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_thread(&self, draft: ThreadDraft) -> RepoResult<Thread> {
        let mut s = self.write()?;
        if !s.categories.contains_key(&draft.category_id) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let thread = Thread {
            id,
            title: draft.title,
            course_id: draft.course_id,
            resource_id: draft.resource_id,
            author_id: Some(draft.author_id),
            content: draft.content,
            created_at: Utc::now(),
            is_locked: false,
            is_deleted: false,
            category_id: draft.category_id,
        };
        s.threads.insert(id, thread.clone());
        let mut tag_ids: Vec<Id> = draft.tag_ids.into_iter().filter(|t| s.tags.contains_key(t)).collect();
        tag_ids.sort_unstable();
        tag_ids.dedup();
        s.thread_tags.insert(id, tag_ids);
        self.persist(&s);
        Ok(thread)
    }

    async fn mark_thread_deleted(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.threads.get_mut(&id).ok_or(RepoError::NotFound)?.is_deleted = true;
        self.persist(&s);
        Ok(())
    }

    async fn toggle_thread_lock(&self, id: Id) -> RepoResult<bool> {
        let mut s = self.write()?;
        let thread = s.threads.get_mut(&id).ok_or(RepoError::NotFound)?;
        thread.is_locked = !thread.is_locked;
        let locked = thread.is_locked;
        self.persist(&s);
        Ok(locked)
    }
}

#[async_trait]
impl ReplyRepo for InMemRepo {
    async fn list_replies(&self, thread_id: Id, q: &ReplyQuery) -> RepoResult<Page<ReplySummary>> {
        let s = self.read()?;
        let rows = s
            .replies
            .values()
            .filter(|r| r.thread_id == thread_id)
            .map(|r| s.summarize_reply(r))
            .collect();
        Ok(Page::paginate(rank_replies(rows, q), q.page))
    }

    async fn visible_reply_ids(&self, thread_id: Id) -> RepoResult<Vec<Id>> {
        let s = self.read()?;
        let mut v: Vec<&Reply> = s
            .replies
            .values()
            .filter(|r| r.thread_id == thread_id && !r.is_deleted)
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v.into_iter().map(|r| r.id).collect())
    }

    async fn get_reply(&self, id: Id) -> RepoResult<Reply> {
        self.read()?.replies.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_reply(&self, draft: ReplyDraft) -> RepoResult<Reply> {
        let mut s = self.write()?;
        if !s.threads.contains_key(&draft.thread_id) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let reply = Reply {
            id,
            thread_id: draft.thread_id,
            parent_id: draft.parent_id,
            author_id: Some(draft.author_id),
            content: draft.content,
            created_at: Utc::now(),
            is_deleted: false,
        };
        s.replies.insert(id, reply.clone());
        self.persist(&s);
        Ok(reply)
    }

    async fn mark_reply_deleted(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.replies.get_mut(&id).ok_or(RepoError::NotFound)?.is_deleted = true;
        self.persist(&s);
        Ok(())
    }

    async fn count_visible_replies_before(&self, reply: &Reply) -> RepoResult<i64> {
        let s = self.read()?;
        let n = s
            .replies
            .values()
            .filter(|r| {
                r.thread_id == reply.thread_id
                    && !r.is_deleted
                    && (r.created_at, r.id) < (reply.created_at, reply.id)
            })
            .count();
        Ok(n as i64)
    }
}

#[async_trait]
impl UpvoteRepo for InMemRepo {
    async fn toggle_upvote(&self, user_id: Id, target: Target) -> RepoResult<UpvoteState> {
        let mut s = self.write()?;
        if !s.target_exists(target) {
            return Err(RepoError::NotFound);
        }
        let key = (user_id, target.id());
        let set = match target {
            Target::Thread(_) => &mut s.thread_upvotes,
            Target::Reply(_) => &mut s.reply_upvotes,
        };
        if !set.remove(&key) {
            set.insert(key);
        }
        let state = s.state_of(user_id, target);
        self.persist(&s);
        Ok(state)
    }

    async fn upvote_state(&self, user_id: Id, target: Target) -> RepoResult<UpvoteState> {
        let s = self.read()?;
        if !s.target_exists(target) {
            return Err(RepoError::NotFound);
        }
        Ok(s.state_of(user_id, target))
    }
}

fn same_target(r: &Report, author_id: Id, target: Target) -> bool {
    r.author_id == Some(author_id)
        && match target {
            Target::Thread(id) => r.thread_id == id && r.reply_id.is_none(),
            Target::Reply(id) => r.reply_id == Some(id),
        }
}

#[async_trait]
impl ReportRepo for InMemRepo {
    async fn has_reported(&self, author_id: Id, target: Target) -> RepoResult<bool> {
        let s = self.read()?;
        Ok(s.reports.values().any(|r| same_target(r, author_id, target)))
    }

    async fn create_report(&self, draft: ReportDraft) -> RepoResult<Report> {
        let mut s = self.write()?;
        let target = match draft.reply_id {
            Some(id) => Target::Reply(id),
            None => Target::Thread(draft.thread_id),
        };
        if !s.threads.contains_key(&draft.thread_id) || !s.target_exists(target) {
            return Err(RepoError::NotFound);
        }
        if s.reports.values().any(|r| same_target(r, draft.author_id, target)) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let report = Report {
            id,
            author_id: Some(draft.author_id),
            thread_id: draft.thread_id,
            reply_id: draft.reply_id,
            reason: draft.reason,
            created_at: Utc::now(),
            resolved: false,
        };
        s.reports.insert(id, report.clone());
        self.persist(&s);
        Ok(report)
    }

    async fn list_open_reports(&self) -> RepoResult<Vec<Report>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.reports.values().filter(|r| !r.resolved).cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(v)
    }

    async fn resolve_report(&self, id: Id) -> RepoResult<Report> {
        let mut s = self.write()?;
        let report = s.reports.get_mut(&id).ok_or(RepoError::NotFound)?;
        report.resolved = true;
        let report = report.clone();
        self.persist(&s);
        Ok(report)
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn upsert_user(&self, email: &str, username: &str) -> RepoResult<User> {
        let mut s = self.write()?;
        let existing = s.users.values().find(|u| u.email == email).map(|u| u.id);
        let user = match existing {
            Some(id) => {
                let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
                user.username = username.to_owned();
                user.clone()
            }
            None => {
                let id = s.next_id();
                let user = User { id, email: email.to_owned(), username: username.to_owned(), permissions: Vec::new() };
                s.users.insert(id, user.clone());
                user
            }
        };
        self.persist(&s);
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn set_permissions(&self, id: Id, permissions: &[String]) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.permissions = permissions.to_vec();
        let user = user.clone();
        self.persist(&s);
        Ok(user)
    }
}
