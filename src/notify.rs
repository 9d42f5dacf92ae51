//! Reply notifications.
//!
//! Delivery is at most once: the email is handed to a detached task, the
//! reply request never waits for it, and a failed send is logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::MailConfig;
use crate::models::{Id, Reply, Thread};
use crate::repo::Repo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("mail relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay answered {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Posts each message as JSON to an HTTP mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    cfg: MailConfig,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(cfg: MailConfig) -> Self {
        Self { client: reqwest::Client::new(), cfg }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let mut req = self.client.post(&self.cfg.api_url).json(&RelayMessage {
            from: &self.cfg.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.body,
        });
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(MailError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Used when no relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "mail relay not configured, email not sent");
        Ok(())
    }
}

/// Who hears about a new reply: the parent reply's author for nested
/// replies, the thread's author for top-level ones. Never the replier.
pub fn reply_recipient(thread: &Thread, parent: Option<&Reply>, reply: &Reply) -> Option<Id> {
    let candidate = match parent {
        Some(p) => p.author_id,
        None => thread.author_id,
    }?;
    (Some(candidate) != reply.author_id).then_some(candidate)
}

#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    site_url: Arc<str>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, site_url: &str) -> Self {
        Self { mailer, site_url: Arc::from(site_url.trim_end_matches('/')) }
    }

    fn compose(&self, to: String, thread: &Thread, category_slug: &str, parent: Option<&Reply>, reply: &Reply) -> Email {
        let what = if parent.is_some() { "your reply" } else { "your thread" };
        let excerpt: String = reply.content.chars().take(280).collect();
        Email {
            to,
            subject: format!("New reply on \"{}\"", thread.title),
            body: format!(
                "Someone replied to {what} in \"{}\":\n\n{excerpt}\n\n{}/thread/{}/{}/\n",
                thread.title, self.site_url, category_slug, thread.id
            ),
        }
    }

    /// Spawns the notification for `reply`, if anyone should get one. The
    /// handle is only useful to tests; request handlers drop it.
    pub fn reply_created(
        &self,
        repo: Arc<dyn Repo>,
        thread: &Thread,
        category_slug: &str,
        parent: Option<&Reply>,
        reply: &Reply,
    ) -> Option<JoinHandle<()>> {
        let recipient = reply_recipient(thread, parent, reply)?;
        let this = self.clone();
        let (thread, slug, parent, reply) = (thread.clone(), category_slug.to_owned(), parent.cloned(), reply.clone());
        Some(tokio::spawn(async move {
            let user = match repo.get_user(recipient).await {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(user_id = recipient, error = %e, "notification recipient lookup failed");
                    return;
                }
            };
            let email = this.compose(user.email, &thread, &slug, parent.as_ref(), &reply);
            match this.mailer.send(&email).await {
                Ok(()) => tracing::debug!(reply_id = reply.id, to = %email.to, "reply notification sent"),
                Err(e) => tracing::warn!(reply_id = reply.id, error = %e, "reply notification dropped"),
            }
        }))
    }
}
