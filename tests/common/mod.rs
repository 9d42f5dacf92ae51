#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use courseboard::auth::{Actor, PermissionSet};
use courseboard::config::Settings;
use courseboard::models::*;
use courseboard::notify::{Email, MailError, Mailer};
use courseboard::repo::inmem::InMemRepo;
use courseboard::repo::{CatalogRepo, ReplyDraft, ReplyRepo, ThreadDraft, ThreadRepo, UserRepo};
use courseboard::AppState;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn settings() -> Settings {
    Settings::with_secret(SECRET)
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

/// In-memory forum with three users, one category and a course with a resource.
pub struct Forum {
    pub state: AppState,
    pub repo: InMemRepo,
    pub mailer: Arc<RecordingMailer>,
    pub alice: User,
    pub bob: User,
    pub moderator: User,
    pub category: Category,
    pub course: Course,
    pub resource: Resource,
}

pub async fn forum() -> Forum {
    forum_with(settings()).await
}

pub async fn forum_with(settings: Settings) -> Forum {
    let repo = InMemRepo::new();
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(Arc::new(repo.clone()), mailer.clone(), settings);

    let alice = repo.upsert_user("alice@pilani.bits-pilani.ac.in", "alice").await.unwrap();
    let bob = repo.upsert_user("bob@goa.bits-pilani.ac.in", "bob").await.unwrap();
    let moderator = repo.upsert_user("mod@pilani.bits-pilani.ac.in", "mod").await.unwrap();
    let moderator = repo.set_permissions(moderator.id, &PermissionSet::all().names()).await.unwrap();

    let category = repo
        .create_category(NewLabel { name: "Exams".into(), slug: "exams".into() })
        .await
        .unwrap();
    let course = repo
        .create_course(NewCourse { code: "CS F211".into(), title: "Data Structures".into(), department: "CS".into() })
        .await
        .unwrap();
    let resource = repo
        .create_resource(NewResource {
            course_id: course.id,
            title: "Midsem paper".into(),
            kind: ResourceKind::Pdf,
            link: "https://example.com/midsem.pdf".into(),
        })
        .await
        .unwrap();

    Forum { state, repo, mailer, alice, bob, moderator, category, course, resource }
}

impl Forum {
    pub fn token(&self, user: &User) -> String {
        self.state.jwt.issue(user, &PermissionSet::from_names(&user.permissions)).unwrap()
    }

    pub fn bearer(&self, user: &User) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token(user)))
    }

    pub fn actor(&self, user: &User) -> Actor {
        Actor { user_id: user.id, perms: PermissionSet::from_names(&user.permissions) }
    }

    pub async fn thread(&self, author: &User, title: &str) -> Thread {
        self.repo
            .create_thread(ThreadDraft {
                title: title.into(),
                course_id: None,
                resource_id: None,
                author_id: author.id,
                content: format!("Body of {title}"),
                category_id: self.category.id,
                tag_ids: vec![],
            })
            .await
            .unwrap()
    }

    pub async fn reply(&self, thread: &Thread, author: &User, parent: Option<&Reply>) -> Reply {
        self.repo
            .create_reply(ReplyDraft {
                thread_id: thread.id,
                parent_id: parent.map(|p| p.id),
                author_id: author.id,
                content: "Reply body".into(),
            })
            .await
            .unwrap()
    }
}
