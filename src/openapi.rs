use utoipa::OpenApi;

use crate::auth::Permission;
use crate::listing::{Order, SortKey};
use crate::models::{
    Category, Course, NewCourse, NewLabel, NewReply, NewReport, NewResource, NewThread, Reply, ReplySummary, Report,
    Resource, ResourceKind, ResourceOption, Tag, Thread, ThreadSummary, UpvoteState, User,
};
use crate::moderation::{ReportTarget, ReportView};
use crate::routes::{admin, forum, login, moderate, Notice, NoticeLevel, ReplyView, ThreadView};

#[derive(OpenApi)]
#[openapi(
    paths(
        forum::list_threads,
        forum::list_categories,
        forum::list_category_threads,
        forum::thread_detail,
        forum::create_thread_form,
        forum::create_thread,
        forum::create_reply,
        forum::ajax_resources,
        moderate::delete_thread,
        moderate::delete_reply,
        moderate::toggle_lock,
        moderate::toggle_thread_like,
        moderate::thread_like_state,
        moderate::toggle_reply_like,
        moderate::reply_like_state,
        moderate::report_thread_form,
        moderate::report_thread,
        moderate::report_reply_form,
        moderate::report_reply,
        moderate::list_reports,
        moderate::resolve_report,
        login::google_login,
        login::google_callback,
        login::refresh_token,
        login::auth_me,
        admin::create_course,
        admin::create_resource,
        admin::create_category,
        admin::delete_category,
        admin::create_tag,
        admin::set_permissions,
    ),
    components(schemas(
        Course, NewCourse, Resource, NewResource, ResourceKind, ResourceOption, Tag, Category, NewLabel,
        Thread, ThreadSummary, NewThread, Reply, ReplySummary, NewReply, Report, NewReport, User, UpvoteState,
        Permission, SortKey, Order, Notice, NoticeLevel, ThreadView, ReplyView, ReportTarget, ReportView,
        forum::ThreadListing, forum::ThreadDetail, forum::ThreadFormOptions, forum::ThreadCreated, forum::ReplyCreated,
        moderate::Deleted, moderate::LockState, moderate::ReportForm, moderate::ReportFiled,
        login::TokenBody, login::MeResponse, admin::SetPermissionsRequest,
    )),
    tags(
        (name = "forum", description = "Threads, replies and listings"),
        (name = "moderation", description = "Deletion, locking, reports and upvotes"),
        (name = "auth", description = "Login and sessions"),
        (name = "admin", description = "Catalog and capability administration"),
    )
)]
pub struct ApiDoc;
