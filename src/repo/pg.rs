use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::*;
use crate::listing::{Page, PageWindow, SortKey, PER_PAGE, SIMILARITY_THRESHOLD};

const THREAD_COLS: &str = "t.id, t.title, t.course_id, t.resource_id, t.author_id, t.content, \
     t.created_at, t.is_locked, t.is_deleted, t.category_id";

const THREAD_SUMMARY_SELECT: &str = "SELECT t.id, t.title, t.course_id, t.resource_id, t.author_id, t.content, \
            t.created_at, t.is_locked, t.is_deleted, t.category_id, \
            c.slug AS category_slug, u.username AS author_name, \
            (SELECT COUNT(*) FROM upvote_threads v WHERE v.thread_id = t.id) AS upvote_count \
     FROM threads t \
     JOIN categories c ON c.id = t.category_id \
     LEFT JOIN users u ON u.id = t.author_id";

const REPLY_COLS: &str = "id, thread_id, parent_id, author_id, content, created_at, is_deleted";

const REPLY_SUMMARY_SELECT: &str = "SELECT r.id, r.thread_id, r.parent_id, r.author_id, r.content, r.created_at, r.is_deleted, \
            u.username AS author_name, \
            (SELECT COUNT(*) FROM upvote_replies v WHERE v.reply_id = r.id) AS upvote_count \
     FROM replies r \
     LEFT JOIN users u ON u.id = r.author_id";

const REPORT_COLS: &str = "id, author_id, thread_id, reply_id, reason, created_at, resolved";

/// Upvote join table and its target column.
fn upvote_table(target: Target) -> (&'static str, &'static str, &'static str) {
    match target {
        Target::Thread(_) => ("upvote_threads", "thread_id", "threads"),
        Target::Reply(_) => ("upvote_replies", "reply_id", "replies"),
    }
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn upvote_state_in<'e, E>(exec: E, user_id: Id, target: Target) -> RepoResult<UpvoteState>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let (table, col, _) = upvote_table(target);
        let (upvote_count, liked): (i64, bool) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) FROM {table} WHERE {col} = $1"
        ))
        .bind(target.id())
        .bind(user_id)
        .fetch_one(exec)
        .await?;
        Ok(UpvoteState { upvote_count, liked })
    }

    async fn target_exists(&self, target: Target) -> RepoResult<bool> {
        let (_, _, owner) = upvote_table(target);
        let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {owner} WHERE id = $1)"))
            .bind(target.id())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl CatalogRepo for PgRepo {
    async fn list_courses(&self) -> RepoResult<Vec<Course>> {
        let recs = sqlx::query_as::<_, Course>("SELECT id, code, title, department FROM courses ORDER BY code, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn get_course(&self, id: Id) -> RepoResult<Course> {
        let rec = sqlx::query_as::<_, Course>("SELECT id, code, title, department FROM courses WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_course(&self, new: NewCourse) -> RepoResult<Course> {
        let rec = sqlx::query_as::<_, Course>(
            "INSERT INTO courses (code, title, department) VALUES ($1,$2,$3) RETURNING id, code, title, department",
        )
        .bind(&new.code)
        .bind(&new.title)
        .bind(&new.department)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_resource(&self, id: Id) -> RepoResult<Resource> {
        let rec = sqlx::query_as::<_, Resource>("SELECT id, course_id, title, kind, link FROM resources WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_resource(&self, new: NewResource) -> RepoResult<Resource> {
        let rec = sqlx::query_as::<_, Resource>(
            "INSERT INTO resources (course_id, title, kind, link) VALUES ($1,$2,$3,$4) \
             RETURNING id, course_id, title, kind, link",
        )
        .bind(new.course_id)
        .bind(&new.title)
        .bind(new.kind)
        .bind(&new.link)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match RepoError::from(e) {
            // unknown course surfaces as a foreign key violation
            RepoError::Conflict => RepoError::NotFound,
            other => other,
        })?;
        Ok(rec)
    }

    async fn list_resources_for_course(&self, course_id: Id) -> RepoResult<Vec<ResourceOption>> {
        let recs = sqlx::query_as::<_, ResourceOption>("SELECT id, title FROM resources WHERE course_id = $1 ORDER BY id")
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let recs = sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        let rec = sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_category(&self, new: NewLabel) -> RepoResult<Category> {
        let rec = sqlx::query_as::<_, Category>("INSERT INTO categories (name, slug) VALUES ($1,$2) RETURNING id, name, slug")
            .bind(&new.name)
            .bind(&new.slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn delete_category(&self, slug: &str) -> RepoResult<()> {
        // ON DELETE RESTRICT turns a referenced category into a foreign key violation
        let res = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let recs = sqlx::query_as::<_, Tag>("SELECT id, name, slug FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn create_tag(&self, new: NewLabel) -> RepoResult<Tag> {
        let rec = sqlx::query_as::<_, Tag>("INSERT INTO tags (name, slug) VALUES ($1,$2) RETURNING id, name, slug")
            .bind(&new.name)
            .bind(&new.slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn get_tags(&self, ids: &[Id]) -> RepoResult<Vec<Tag>> {
        let recs = sqlx::query_as::<_, Tag>("SELECT id, name, slug FROM tags WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }
}

#[async_trait]
impl ThreadRepo for PgRepo {
    async fn list_threads(&self, q: &ThreadQuery) -> RepoResult<Page<ThreadSummary>> {
        let filter = "WHERE NOT t.is_deleted \
                      AND ($1::text IS NULL OR c.slug = $1) \
                      AND ($2::text IS NULL OR similarity(t.title, $2) > $3::real)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM threads t JOIN categories c ON c.id = t.category_id {filter}"
        ))
        .bind(q.category_slug.as_deref())
        .bind(q.search.as_deref())
        .bind(SIMILARITY_THRESHOLD)
        .fetch_one(&self.pool)
        .await?;
        let window = PageWindow::locate(total, q.page);

        let order_by = if q.search.is_some() {
            "similarity(t.title, $2) DESC, t.created_at DESC, t.id DESC".to_owned()
        } else {
            let dir = q.order.sql();
            match q.sort {
                SortKey::Latest => format!("t.created_at {dir}, t.id {dir}"),
                SortKey::Popular => format!("upvote_count {dir}, t.created_at {dir}, t.id {dir}"),
            }
        };
        let items = sqlx::query_as::<_, ThreadSummary>(&format!(
            "{THREAD_SUMMARY_SELECT} {filter} ORDER BY {order_by} LIMIT $4 OFFSET $5"
        ))
        .bind(q.category_slug.as_deref())
        .bind(q.search.as_deref())
        .bind(SIMILARITY_THRESHOLD)
        .bind(PER_PAGE)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::from_window(items, window, total))
    }

    async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
        let rec = sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLS} FROM threads t WHERE t.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn thread_summary(&self, id: Id) -> RepoResult<ThreadSummary> {
        let rec = sqlx::query_as::<_, ThreadSummary>(&format!("{THREAD_SUMMARY_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn thread_tags(&self, id: Id) -> RepoResult<Vec<Tag>> {
        let recs = sqlx::query_as::<_, Tag>(
            "SELECT g.id, g.name, g.slug FROM tags g JOIN thread_tags tt ON tt.tag_id = g.id \
             WHERE tt.thread_id = $1 ORDER BY g.name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn create_thread(&self, draft: ThreadDraft) -> RepoResult<Thread> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query_as::<_, Thread>(&format!(
            "INSERT INTO threads AS t (title, course_id, resource_id, author_id, content, category_id) \
             VALUES ($1,$2,$3,$4,$5,$6) RETURNING {THREAD_COLS}"
        ))
        .bind(&draft.title)
        .bind(draft.course_id)
        .bind(draft.resource_id)
        .bind(draft.author_id)
        .bind(&draft.content)
        .bind(draft.category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match RepoError::from(e) {
            RepoError::Conflict => RepoError::NotFound,
            other => other,
        })?;
        if !draft.tag_ids.is_empty() {
            sqlx::query(
                "INSERT INTO thread_tags (thread_id, tag_id) \
                 SELECT $1, g.id FROM tags g WHERE g.id = ANY($2) ON CONFLICT DO NOTHING",
            )
            .bind(rec.id)
            .bind(&draft.tag_ids)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rec)
    }

    async fn mark_thread_deleted(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("UPDATE threads SET is_deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn toggle_thread_lock(&self, id: Id) -> RepoResult<bool> {
        let locked: bool =
            sqlx::query_scalar("UPDATE threads SET is_locked = NOT is_locked WHERE id = $1 RETURNING is_locked")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(locked)
    }
}

#[async_trait]
impl ReplyRepo for PgRepo {
    async fn list_replies(&self, thread_id: Id, q: &ReplyQuery) -> RepoResult<Page<ReplySummary>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM replies WHERE thread_id = $1 AND NOT is_deleted")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;
        let window = PageWindow::locate(total, q.page);
        let dir = q.order.sql();
        let order_by = match q.sort {
            SortKey::Latest => format!("r.created_at {dir}, r.id {dir}"),
            SortKey::Popular => format!("upvote_count {dir}, r.created_at {dir}, r.id {dir}"),
        };
        let items = sqlx::query_as::<_, ReplySummary>(&format!(
            "{REPLY_SUMMARY_SELECT} WHERE r.thread_id = $1 AND NOT r.is_deleted \
             ORDER BY {order_by} LIMIT $2 OFFSET $3"
        ))
        .bind(thread_id)
        .bind(PER_PAGE)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::from_window(items, window, total))
    }

    async fn visible_reply_ids(&self, thread_id: Id) -> RepoResult<Vec<Id>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM replies WHERE thread_id = $1 AND NOT is_deleted ORDER BY created_at, id",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_reply(&self, id: Id) -> RepoResult<Reply> {
        let rec = sqlx::query_as::<_, Reply>(&format!("SELECT {REPLY_COLS} FROM replies WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_reply(&self, draft: ReplyDraft) -> RepoResult<Reply> {
        let rec = sqlx::query_as::<_, Reply>(&format!(
            "INSERT INTO replies (thread_id, parent_id, author_id, content) VALUES ($1,$2,$3,$4) RETURNING {REPLY_COLS}"
        ))
        .bind(draft.thread_id)
        .bind(draft.parent_id)
        .bind(draft.author_id)
        .bind(&draft.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match RepoError::from(e) {
            RepoError::Conflict => RepoError::NotFound,
            other => other,
        })?;
        Ok(rec)
    }

    async fn mark_reply_deleted(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("UPDATE replies SET is_deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_visible_replies_before(&self, reply: &Reply) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM replies \
             WHERE thread_id = $1 AND NOT is_deleted AND (created_at, id) < ($2, $3)",
        )
        .bind(reply.thread_id)
        .bind(reply.created_at)
        .bind(reply.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}

#[async_trait]
impl UpvoteRepo for PgRepo {
    async fn toggle_upvote(&self, user_id: Id, target: Target) -> RepoResult<UpvoteState> {
        if !self.target_exists(target).await? {
            return Err(RepoError::NotFound);
        }
        let (table, col, _) = upvote_table(target);
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1 AND {col} = $2"))
            .bind(user_id)
            .bind(target.id())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            // the unique (user_id, target) constraint absorbs a concurrent twin
            sqlx::query(&format!(
                "INSERT INTO {table} (user_id, {col}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            ))
            .bind(user_id)
            .bind(target.id())
            .execute(&mut *tx)
            .await?;
        }
        let state = Self::upvote_state_in(&mut *tx, user_id, target).await?;
        tx.commit().await?;
        Ok(state)
    }

    async fn upvote_state(&self, user_id: Id, target: Target) -> RepoResult<UpvoteState> {
        if !self.target_exists(target).await? {
            return Err(RepoError::NotFound);
        }
        Self::upvote_state_in(&self.pool, user_id, target).await
    }
}

#[async_trait]
impl ReportRepo for PgRepo {
    async fn has_reported(&self, author_id: Id, target: Target) -> RepoResult<bool> {
        let sql = match target {
            Target::Thread(_) => {
                "SELECT EXISTS(SELECT 1 FROM reports WHERE author_id = $1 AND thread_id = $2 AND reply_id IS NULL)"
            }
            Target::Reply(_) => "SELECT EXISTS(SELECT 1 FROM reports WHERE author_id = $1 AND reply_id = $2)",
        };
        let exists: bool = sqlx::query_scalar(sql)
            .bind(author_id)
            .bind(target.id())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create_report(&self, draft: ReportDraft) -> RepoResult<Report> {
        let rec = sqlx::query_as::<_, Report>(&format!(
            "INSERT INTO reports (author_id, thread_id, reply_id, reason) VALUES ($1,$2,$3,$4) RETURNING {REPORT_COLS}"
        ))
        .bind(draft.author_id)
        .bind(draft.thread_id)
        .bind(draft.reply_id)
        .bind(&draft.reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn list_open_reports(&self) -> RepoResult<Vec<Report>> {
        let recs = sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLS} FROM reports WHERE NOT resolved ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn resolve_report(&self, id: Id) -> RepoResult<Report> {
        let rec = sqlx::query_as::<_, Report>(&format!(
            "UPDATE reports SET resolved = TRUE WHERE id = $1 RETURNING {REPORT_COLS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn upsert_user(&self, email: &str, username: &str) -> RepoResult<User> {
        let rec = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, username) VALUES ($1,$2) \
             ON CONFLICT (email) DO UPDATE SET username = EXCLUDED.username \
             RETURNING id, email, username, permissions",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let rec = sqlx::query_as::<_, User>("SELECT id, email, username, permissions FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn set_permissions(&self, id: Id, permissions: &[String]) -> RepoResult<User> {
        let rec = sqlx::query_as::<_, User>(
            "UPDATE users SET permissions = $2 WHERE id = $1 RETURNING id, email, username, permissions",
        )
        .bind(id)
        .bind(permissions)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }
}
