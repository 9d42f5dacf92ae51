mod common;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use courseboard::config::MailConfig;
use courseboard::notify::{Email, HttpMailer, MailError, Mailer, Notifier};
use courseboard::repo::Repo;
use courseboard::{config, AppState};

use common::{forum, settings};

struct FailingMailer;

#[async_trait::async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &Email) -> Result<(), MailError> {
        Err(MailError::Rejected(503))
    }
}

#[tokio::test]
async fn thread_author_hears_about_top_level_replies() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Tutorial 3").await;
    let reply = f.reply(&thread, &f.bob, None).await;
    let repo: Arc<dyn Repo> = Arc::new(f.repo.clone());

    let handle = f.state.notifier.reply_created(repo, &thread, "exams", None, &reply).expect("alice should be notified");
    handle.await.unwrap();

    let sent = f.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, f.alice.email);
    assert_eq!(sent[0].subject, "New reply on \"Tutorial 3\"");
    assert!(sent[0].body.contains(&format!("http://localhost:8080/thread/exams/{}/", thread.id)));
}

#[tokio::test]
async fn nested_reply_notifies_the_parent_author_only() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Nested").await;
    let parent = f.reply(&thread, &f.moderator, None).await;
    let reply = f.reply(&thread, &f.bob, Some(&parent)).await;
    let repo: Arc<dyn Repo> = Arc::new(f.repo.clone());

    f.state.notifier.reply_created(repo, &thread, "exams", Some(&parent), &reply).unwrap().await.unwrap();

    let sent = f.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, f.moderator.email);
}

#[tokio::test]
async fn replying_to_yourself_sends_nothing() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Mine").await;
    let reply = f.reply(&thread, &f.alice, None).await;
    let repo: Arc<dyn Repo> = Arc::new(f.repo.clone());

    assert!(f.state.notifier.reply_created(repo, &thread, "exams", None, &reply).is_none());
    assert!(f.mailer.sent().is_empty());
}

#[actix_web::test]
async fn reply_route_sends_mail_in_the_background() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Background").await;
    let app = test::init_service(App::new().app_data(web::Data::new(f.state.clone())).configure(config)).await;

    let uri = format!("/thread/exams/{}/reply/", thread.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "see page 4"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    for _ in 0..50 {
        if !f.mailer.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let sent = f.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("see page 4"));
}

#[actix_web::test]
async fn mail_failure_does_not_fail_the_reply() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Broken relay").await;
    let state = AppState::new(Arc::new(f.repo.clone()), Arc::new(FailingMailer), settings());
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let uri = format!("/thread/exams/{}/reply/", thread.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "still posted"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[tokio::test]
async fn http_mailer_posts_to_the_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer relay-key"))
        .and(body_partial_json(json!({"from": "forum@uni.test", "to": "alice@pilani.bits-pilani.ac.in"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(MailConfig {
        api_url: format!("{}/send", server.uri()),
        api_key: Some("relay-key".into()),
        from: "forum@uni.test".into(),
    });
    let email = Email { to: "alice@pilani.bits-pilani.ac.in".into(), subject: "s".into(), body: "b".into() };
    mailer.send(&email).await.unwrap();
}

#[tokio::test]
async fn http_mailer_surfaces_relay_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let mailer = HttpMailer::new(MailConfig { api_url: server.uri(), api_key: None, from: "f@x.in".into() });
    let email = Email { to: "t@x.in".into(), subject: "s".into(), body: "b".into() };
    let err = mailer.send(&email).await.unwrap_err();
    assert!(matches!(err, MailError::Rejected(500)));
}

#[tokio::test]
async fn notifier_trims_trailing_slash_from_site_url() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Links").await;
    let reply = f.reply(&thread, &f.bob, None).await;
    let mailer = Arc::new(common::RecordingMailer::default());
    let notifier = Notifier::new(mailer.clone(), "https://forum.example.edu/");

    notifier.reply_created(Arc::new(f.repo.clone()), &thread, "exams", None, &reply).unwrap().await.unwrap();
    assert!(mailer.sent()[0].body.contains(&format!("https://forum.example.edu/thread/exams/{}/", thread.id)));
}
