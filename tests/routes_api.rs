mod common;

use actix_web::{test, web, App};
use serde_json::{json, Value};

use courseboard::config;
use courseboard::repo::{CatalogRepo, ThreadRepo};
use courseboard::models::NewCourse;

use common::forum;

macro_rules! app {
    ($f:expr) => {
        test::init_service(App::new().app_data(web::Data::new($f.state.clone())).configure(config)).await
    };
}

fn titles(listing: &Value) -> Vec<String> {
    listing["threads"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_owned())
        .collect()
}

#[actix_web::test]
async fn listing_requires_a_token() {
    let f = forum().await;
    let app = app!(f);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn listing_hides_deleted_threads_and_renders_markdown() {
    let f = forum().await;
    f.thread(&f.alice, "Kept").await;
    let gone = f.thread(&f.alice, "Gone").await;
    f.repo.mark_thread_deleted(gone.id).await.unwrap();
    let app = app!(f);

    let req = test::TestRequest::get().uri("/").insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(titles(&v), vec!["Kept"]);
    assert_eq!(v["threads"]["total_items"], 1);
    assert_eq!(v["threads"]["items"][0]["content_html"], "<p>Body of Kept</p>\n");
    assert_eq!(v["threads"]["items"][0]["category_slug"], "exams");
    assert_eq!(v["sort"], "latest");
    assert_eq!(v["order"], "desc");
}

#[actix_web::test]
async fn fuzzy_search_matches_misspelled_titles() {
    let f = forum().await;
    f.thread(&f.alice, "Database").await;
    f.thread(&f.alice, "Database Systems Midterm").await;
    f.thread(&f.alice, "Compilers").await;
    let app = app!(f);

    let req = test::TestRequest::get().uri("/?search=databse").insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(titles(&v), vec!["Database"]);
    assert_eq!(v["search"], "databse");
}

#[actix_web::test]
async fn search_without_matches_is_an_empty_page() {
    let f = forum().await;
    f.thread(&f.alice, "Database").await;
    let app = app!(f);

    let req = test::TestRequest::get().uri("/?search=zzzz").insert_header(f.bearer(&f.bob)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["threads"]["items"], json!([]));
    assert_eq!(v["threads"]["total_items"], 0);
    assert_eq!(v["threads"]["total_pages"], 1);
    assert_eq!(v["threads"]["page"], 1);
}

#[actix_web::test]
async fn listing_sorts_and_clamps_pages() {
    let f = forum().await;
    for n in 0..12 {
        f.thread(&f.alice, &format!("Thread {n}")).await;
    }
    let app = app!(f);

    let req = test::TestRequest::get().uri("/?order=asc&page=99").insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["threads"]["page"], 2);
    assert_eq!(titles(&v), vec!["Thread 10", "Thread 11"]);

    let req = test::TestRequest::get().uri("/?page=abc&sort=bogus").insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["threads"]["page"], 1);
    assert_eq!(v["sort"], "latest");
    assert_eq!(titles(&v)[0], "Thread 11");
}

#[actix_web::test]
async fn category_listing_filters_and_unknown_slug_is_404() {
    let f = forum().await;
    f.thread(&f.alice, "In exams").await;
    let app = app!(f);

    let req = test::TestRequest::get().uri("/categories/exams/").insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(titles(&v), vec!["In exams"]);
    assert_eq!(v["category"]["slug"], "exams");

    let req = test::TestRequest::get().uri("/categories/nope/").insert_header(f.bearer(&f.bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/categories/").insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn thread_detail_pages_replies_and_maps_them() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Busy").await;
    let mut last = None;
    for _ in 0..15 {
        last = Some(f.reply(&thread, &f.bob, None).await);
    }
    let last = last.unwrap();
    let app = app!(f);

    let uri = format!("/thread/exams/{}/?page=2", thread.id);
    let req = test::TestRequest::get().uri(&uri).insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["thread"]["title"], "Busy");
    assert_eq!(v["replies"]["items"].as_array().unwrap().len(), 5);
    assert_eq!(v["replies"]["page"], 2);
    assert_eq!(v["reply_page_map"].as_object().unwrap().len(), 15);
    assert_eq!(v["reply_page_map"][last.id.to_string()], 2);
    assert_eq!(v["upvotes"]["liked"], false);
}

#[actix_web::test]
async fn thread_detail_checks_category_and_deletion() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Soon gone").await;
    let app = app!(f);

    let uri = format!("/thread/other/{}/", thread.id);
    let req = test::TestRequest::get().uri(&uri).insert_header(f.bearer(&f.bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    f.repo.mark_thread_deleted(thread.id).await.unwrap();
    let uri = format!("/thread/exams/{}/", thread.id);
    let req = test::TestRequest::get().uri(&uri).insert_header(f.bearer(&f.bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn create_thread_warns_on_course_mismatch() {
    let f = forum().await;
    let other = f
        .repo
        .create_course(NewCourse { code: "MATH F111".into(), title: "Mathematics I".into(), department: "MATH".into() })
        .await
        .unwrap();
    let app = app!(f);

    let req = test::TestRequest::post()
        .uri("/create_thread/")
        .insert_header(f.bearer(&f.alice))
        .set_json(json!({
            "title": "  Past papers  ",
            "course_id": other.id,
            "resource_id": f.resource.id,
            "category_id": f.category.id,
            "content": "Anyone have **these**?"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["thread"]["title"], "Past papers");
    assert_eq!(v["thread"]["author_id"], f.alice.id);
    assert_eq!(v["thread"]["content_html"], "<p>Anyone have <strong>these</strong>?</p>\n");
    let notices = v["notices"].as_array().unwrap();
    assert_eq!(notices[0], json!({"level": "warning", "message": "The resource should be of the same course!"}));
    assert_eq!(notices[1], json!({"level": "success", "message": "Your thread has been created!"}));
}

#[actix_web::test]
async fn create_thread_matching_course_has_no_warning() {
    let f = forum().await;
    let app = app!(f);
    let req = test::TestRequest::post()
        .uri("/create_thread/")
        .insert_header(f.bearer(&f.alice))
        .set_json(json!({
            "title": "Midsem",
            "course_id": f.course.id,
            "resource_id": f.resource.id,
            "category_id": f.category.id,
            "content": "text"
        }))
        .to_request();
    let v: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(v["notices"].as_array().unwrap().len(), 1);
    assert_eq!(v["thread"]["course_id"], f.course.id);
}

#[actix_web::test]
async fn create_thread_reports_field_errors_and_echoes_values() {
    let f = forum().await;
    let app = app!(f);
    let req = test::TestRequest::post()
        .uri("/create_thread/")
        .insert_header(f.bearer(&f.alice))
        .set_json(json!({
            "title": "   ",
            "category_id": 999,
            "tag_ids": [42],
            "content": "kept text"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["error"], "validation");
    assert!(v["fields"]["title"].is_array());
    assert_eq!(v["fields"]["category_id"][0], "Select a valid choice.");
    assert_eq!(v["fields"]["tag_ids"][0], "Select a valid choice.");
    assert_eq!(v["values"]["content"], "kept text");

    let req = test::TestRequest::get().uri("/").insert_header(f.bearer(&f.alice)).to_request();
    let listing: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listing["threads"]["total_items"], 0);
}

#[actix_web::test]
async fn create_thread_form_lists_choices() {
    let f = forum().await;
    let app = app!(f);
    let req = test::TestRequest::get().uri("/create_thread/").insert_header(f.bearer(&f.alice)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["courses"][0]["code"], "CS F211");
    assert_eq!(v["categories"][0]["slug"], "exams");
    assert!(v["tags"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn replies_nest_and_land_on_their_page() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Q").await;
    let parent = f.reply(&thread, &f.alice, None).await;
    let app = app!(f);

    let uri = format!("/thread/exams/{}/reply/{}/", thread.id, parent.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "answer"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["reply"]["parent_id"], parent.id);
    assert_eq!(v["reply"]["author_name"], "bob");
    assert_eq!(v["page"], 1);
    assert_eq!(v["notices"][0]["message"], "Your reply has been created!");

    let uri = format!("/thread/exams/{}/reply/", thread.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "top level"}))
        .to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert!(v["reply"]["parent_id"].is_null());
}

#[actix_web::test]
async fn reply_parent_from_another_thread_is_404() {
    let f = forum().await;
    let here = f.thread(&f.alice, "Here").await;
    let there = f.thread(&f.alice, "There").await;
    let foreign = f.reply(&there, &f.alice, None).await;
    let app = app!(f);

    let uri = format!("/thread/exams/{}/reply/{}/", here.id, foreign.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "x"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn locked_threads_refuse_replies() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Closed").await;
    f.repo.toggle_thread_lock(thread.id).await.unwrap();
    let app = app!(f);

    let uri = format!("/thread/exams/{}/reply/", thread.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "too late"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn blank_reply_is_a_validation_error() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Open").await;
    let app = app!(f);

    let uri = format!("/thread/exams/{}/reply/", thread.id);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(f.bearer(&f.bob))
        .set_json(json!({"content": "  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["fields"]["content"][0], "This field is required.");
}

#[actix_web::test]
async fn wrong_verb_on_known_path_is_forbidden() {
    let f = forum().await;
    let thread = f.thread(&f.alice, "Verbs").await;
    let app = app!(f);

    let req = test::TestRequest::delete().uri("/").insert_header(f.bearer(&f.bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let uri = format!("/delete/thread/{}/", thread.id);
    let req = test::TestRequest::get().uri(&uri).insert_header(f.bearer(&f.alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    assert!(!f.repo.get_thread(thread.id).await.unwrap().is_deleted);
}

#[actix_web::test]
async fn ajax_resources_lists_course_resources() {
    let f = forum().await;
    let app = app!(f);

    let uri = format!("/ajax/resources/?course_id={}", f.course.id);
    let req = test::TestRequest::get().uri(&uri).insert_header(f.bearer(&f.bob)).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v, json!([{"id": f.resource.id, "title": "Midsem paper"}]));

    for uri in ["/ajax/resources/", "/ajax/resources/?course_id=abc", "/ajax/resources/?course_id=777"] {
        let req = test::TestRequest::get().uri(uri).insert_header(f.bearer(&f.bob)).to_request();
        let v: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(v, json!([]), "{uri}");
    }
}
