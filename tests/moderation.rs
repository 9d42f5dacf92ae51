mod common;

use courseboard::auth::{Actor, Permission};
use courseboard::listing::{reply_page_index, ReplyQuery};
use courseboard::models::{NewReport, Target};
use courseboard::moderation::{self, ModerationError, ReportOutcome};
use courseboard::repo::{ReplyRepo, ReportRepo, ThreadRepo};

use common::forum;

fn reason(text: &str) -> NewReport {
    NewReport { reason: text.into() }
}

#[tokio::test]
async fn deleting_someone_elses_thread_is_forbidden_and_changes_nothing() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Quiz 2 answers").await;

    let err = moderation::delete_thread(&f.repo, &f.actor(&f.bob), thread.id).await.unwrap_err();
    assert!(matches!(err, ModerationError::Forbidden));
    assert!(!f.repo.get_thread(thread.id).await.unwrap().is_deleted);
}

#[tokio::test]
async fn authors_and_capability_holders_may_delete() {
    let f = forum().await;
    let own = f.thread(&f.alice, "Mine").await;
    let other = f.thread(&f.alice, "Theirs").await;

    moderation::delete_thread(&f.repo, &f.actor(&f.alice), own.id).await.unwrap();
    let bob_with_cap = Actor::new(f.bob.id, [Permission::DeleteAnyThread]);
    moderation::delete_thread(&f.repo, &bob_with_cap, other.id).await.unwrap();

    assert!(f.repo.get_thread(own.id).await.unwrap().is_deleted);
    assert!(f.repo.get_thread(other.id).await.unwrap().is_deleted);
}

#[tokio::test]
async fn reply_deletion_follows_the_same_rules() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Labs").await;
    let reply = f.reply(&thread, &f.alice, None).await;

    let err = moderation::delete_reply(&f.repo, &f.actor(&f.bob), reply.id).await.unwrap_err();
    assert!(matches!(err, ModerationError::Forbidden));
    let missing = moderation::delete_reply(&f.repo, &f.actor(&f.bob), 9_999).await.unwrap_err();
    assert!(matches!(missing, ModerationError::NotFound));

    let deleted = moderation::delete_reply(&f.repo, &f.actor(&f.moderator), reply.id).await.unwrap();
    assert!(deleted.is_deleted);
    let page = f.repo.list_replies(thread.id, &ReplyQuery::default()).await.unwrap();
    assert_eq!(page.total_items, 0);
}

#[tokio::test]
async fn lock_toggle_needs_the_capability_even_for_the_author() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Locked soon").await;

    let err = moderation::toggle_thread_lock(&f.repo, &f.actor(&f.alice), thread.id).await.unwrap_err();
    assert!(matches!(err, ModerationError::Forbidden));

    let m = f.actor(&f.moderator);
    assert!(moderation::toggle_thread_lock(&f.repo, &m, thread.id).await.unwrap());
    assert!(!moderation::toggle_thread_lock(&f.repo, &m, thread.id).await.unwrap());
}

#[tokio::test]
async fn upvote_toggle_is_an_involution() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Upvote me").await;
    let target = Target::Thread(thread.id);
    let bob = f.actor(&f.bob);

    let before = moderation::upvote_state(&f.repo, &bob, target).await.unwrap();
    let once = moderation::toggle_upvote(&f.repo, &bob, target).await.unwrap();
    assert!(once.liked);
    assert_eq!(once.upvote_count, before.upvote_count + 1);
    let twice = moderation::toggle_upvote(&f.repo, &bob, target).await.unwrap();
    assert_eq!(twice, before);
}

#[tokio::test]
async fn two_upvotes_then_one_removed_leaves_one() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Popular").await;
    let reply = f.reply(&thread, &f.alice, None).await;
    let target = Target::Reply(reply.id);

    moderation::toggle_upvote(&f.repo, &f.actor(&f.alice), target).await.unwrap();
    moderation::toggle_upvote(&f.repo, &f.actor(&f.bob), target).await.unwrap();
    let after = moderation::toggle_upvote(&f.repo, &f.actor(&f.bob), target).await.unwrap();
    assert_eq!(after.upvote_count, 1);
    assert!(!after.liked);

    let missing = moderation::toggle_upvote(&f.repo, &f.actor(&f.bob), Target::Reply(9_999)).await.unwrap_err();
    assert!(matches!(missing, ModerationError::NotFound));
}

#[tokio::test]
async fn duplicate_reports_are_refused_without_a_second_row() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Spam").await;
    let bob = f.actor(&f.bob);
    let target = moderation::resolve_target(&f.repo, Target::Thread(thread.id)).await.unwrap();

    let first = moderation::file_report(&f.repo, &bob, &target, reason("spam")).await.unwrap();
    assert!(matches!(first, ReportOutcome::Filed(_)));
    let second = moderation::file_report(&f.repo, &bob, &target, reason("still spam")).await.unwrap();
    assert!(matches!(second, ReportOutcome::AlreadyReported));

    let open = moderation::list_open_reports(&f.repo, &f.actor(&f.moderator)).await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn reporting_a_reply_does_not_block_reporting_its_thread() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Mixed").await;
    let reply = f.reply(&thread, &f.alice, None).await;
    let bob = f.actor(&f.bob);

    let on_reply = moderation::resolve_target(&f.repo, Target::Reply(reply.id)).await.unwrap();
    let ReportOutcome::Filed(report) = moderation::file_report(&f.repo, &bob, &on_reply, reason("rude")).await.unwrap() else {
        panic!("reply report should be filed");
    };
    assert_eq!(report.thread_id, thread.id);
    assert_eq!(report.reply_id, Some(reply.id));

    let on_thread = moderation::resolve_target(&f.repo, Target::Thread(thread.id)).await.unwrap();
    let outcome = moderation::file_report(&f.repo, &bob, &on_thread, reason("off topic")).await.unwrap();
    assert!(matches!(outcome, ReportOutcome::Filed(_)));
}

#[tokio::test]
async fn resolved_reports_still_count_as_already_reported() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Again").await;
    let bob = f.actor(&f.bob);
    let target = moderation::resolve_target(&f.repo, Target::Thread(thread.id)).await.unwrap();
    let ReportOutcome::Filed(report) = moderation::file_report(&f.repo, &bob, &target, reason("x")).await.unwrap() else {
        panic!("first report should be filed");
    };
    moderation::resolve_report(&f.repo, &f.actor(&f.moderator), report.id).await.unwrap();

    let again = moderation::file_report(&f.repo, &bob, &target, reason("y")).await.unwrap();
    assert!(matches!(again, ReportOutcome::AlreadyReported));
}

#[tokio::test]
async fn resolving_twice_is_a_no_op() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Resolve me").await;
    let target = moderation::resolve_target(&f.repo, Target::Thread(thread.id)).await.unwrap();
    let ReportOutcome::Filed(report) =
        moderation::file_report(&f.repo, &f.actor(&f.bob), &target, reason("dup")).await.unwrap()
    else {
        panic!("report should be filed");
    };
    let m = f.actor(&f.moderator);

    assert!(moderation::resolve_report(&f.repo, &m, report.id).await.unwrap().resolved);
    assert!(moderation::resolve_report(&f.repo, &m, report.id).await.unwrap().resolved);
    assert!(f.repo.list_open_reports().await.unwrap().is_empty());
}

#[tokio::test]
async fn report_queue_requires_the_capability() {
    let f = forum().await;
    let err = moderation::list_open_reports(&f.repo, &f.actor(&f.bob)).await.unwrap_err();
    assert!(matches!(err, ModerationError::Forbidden));
    let err = moderation::resolve_report(&f.repo, &f.actor(&f.bob), 1).await.unwrap_err();
    assert!(matches!(err, ModerationError::Forbidden));
}

#[tokio::test]
async fn reply_page_index_counts_only_visible_earlier_replies() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Long").await;
    let mut replies = Vec::new();
    for _ in 0..25 {
        replies.push(f.reply(&thread, &f.bob, None).await);
    }
    for (n, reply) in replies.iter().enumerate() {
        assert_eq!(reply_page_index(&f.repo, reply).await.unwrap(), n as i64 / 10 + 1);
    }

    // hiding two earlier replies pulls reply #11 back onto page 1
    f.repo.mark_reply_deleted(replies[0].id).await.unwrap();
    f.repo.mark_reply_deleted(replies[1].id).await.unwrap();
    assert_eq!(reply_page_index(&f.repo, &replies[11]).await.unwrap(), 1);
}

#[tokio::test]
async fn report_queue_is_newest_first_with_reply_pages() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Queue").await;
    let mut replies = Vec::new();
    for _ in 0..12 {
        replies.push(f.reply(&thread, &f.alice, None).await);
    }
    let bob = f.actor(&f.bob);
    let on_thread = moderation::resolve_target(&f.repo, Target::Thread(thread.id)).await.unwrap();
    moderation::file_report(&f.repo, &bob, &on_thread, reason("first")).await.unwrap();
    let on_reply = moderation::resolve_target(&f.repo, Target::Reply(replies[11].id)).await.unwrap();
    moderation::file_report(&f.repo, &bob, &on_reply, reason("second")).await.unwrap();

    let open = moderation::list_open_reports(&f.repo, &f.actor(&f.moderator)).await.unwrap();
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].report.reason, "second");
    assert_eq!(open[0].reply_page, Some(2));
    assert_eq!(open[1].report.reason, "first");
    assert_eq!(open[1].reply_page, None);
}
