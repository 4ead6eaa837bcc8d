//! Mail client: folders, messages, replies, drafts and contacts.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

use super::cache::{Folder, MailboxCache};
use super::expect_status;
use super::models::{Contact, Mail, MailDraft, NewReply, Reply};
use crate::auth::{SessionManager, SessionStatus};
use crate::error::ApiError;
use crate::transport::ApiRequest;

const CREATE_PATH: &str = "/mail/create/";
const CREATE_REPLY_PATH: &str = "/mail/reply/create/";
const CONTACTS_PATH: &str = "/contact/list/";

const RETRY_MESSAGE: &str = "Failed. Please try again.";
const UNKNOWN_MESSAGE: &str = "An unknown error occurred.";

/// What can carry a star.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarTarget {
    Mail,
    Reply,
}

impl StarTarget {
    fn manage_path(&self, id: u64) -> String {
        match self {
            Self::Mail => format!("/mail/manage/{}/", id),
            Self::Reply => format!("/mail/reply/manage/{}/", id),
        }
    }
}

/// Result of autosaving a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftSaved {
    /// The draft was created or updated on the server.
    Stored(Mail),
    /// The draft was emptied, so the stored copy was removed.
    Deleted,
    /// Nothing to save and nothing stored.
    Skipped,
}

/// Mail operations for the signed-in user.
///
/// Cached listings belong to one session and are dropped whenever the
/// session signs in or out.
pub struct MailClient {
    session: SessionManager,
    cache: Mutex<MailboxCache>,
    status: Mutex<watch::Receiver<SessionStatus>>,
}

impl MailClient {
    /// Create a client whose folder listings stay fresh for `ttl`.
    pub fn new(session: SessionManager, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(MailboxCache::new(ttl)),
            status: Mutex::new(session.subscribe()),
            session,
        }
    }

    pub async fn inbox(&self) -> Result<Vec<Mail>, ApiError> {
        self.folder(Folder::Inbox).await
    }

    pub async fn sent(&self) -> Result<Vec<Mail>, ApiError> {
        self.folder(Folder::Sent).await
    }

    pub async fn drafts(&self) -> Result<Vec<Mail>, ApiError> {
        self.folder(Folder::Drafts).await
    }

    /// List `folder`, from the cache when it is still fresh.
    ///
    /// A failed fetch is also reported as a warning notice.
    pub async fn folder(&self, folder: Folder) -> Result<Vec<Mail>, ApiError> {
        if let Some(mails) = self.cache().get(folder) {
            debug!("Using cached {} ({} mails)", folder.label(), mails.len());
            return Ok(mails.clone());
        }

        self.reload(folder).await
    }

    /// Fetch `folder` from the server, bypassing the cache.
    pub async fn reload(&self, folder: Folder) -> Result<Vec<Mail>, ApiError> {
        let result = self
            .session
            .authenticated_request(ApiRequest::get(folder.path()))
            .await
            .and_then(|reply| reply.decode::<Vec<Mail>>());

        match result {
            Ok(mails) => {
                info!("Fetched {} mails from {}", mails.len(), folder.label());
                if self.session_changed() {
                    debug!("Session changed while fetching {}, not caching", folder.label());
                } else {
                    self.cache().set(folder, mails.clone());
                }
                Ok(mails)
            }
            Err(e) => {
                let message = match &e {
                    ApiError::Decode(_) => format!("Couldn't fetch {}.", folder.label()),
                    other => other.user_message(),
                };
                self.session.notifier().warn(message);
                Err(e)
            }
        }
    }

    /// Send a mail, or store it as a draft when `is_draft` is set.
    pub async fn create_mail(&self, draft: &MailDraft) -> Result<Mail, ApiError> {
        let request = ApiRequest::post(CREATE_PATH).json(draft)?;
        let reply = self.session.authenticated_request(request).await?;
        self.invalidate();

        let mail = expect_status(reply, 201, RETRY_MESSAGE)?.decode::<Mail>()?;
        debug!(id = ?mail.id, draft = mail.is_draft, "Mail stored");
        Ok(mail)
    }

    pub async fn get_mail(&self, id: u64) -> Result<Mail, ApiError> {
        self.session
            .authenticated_request(ApiRequest::get(format!("/mail/manage/{}", id)))
            .await?
            .decode()
    }

    pub async fn create_reply(&self, reply: &NewReply) -> Result<Reply, ApiError> {
        let request = ApiRequest::post(CREATE_REPLY_PATH).json(reply)?;
        let response = self.session.authenticated_request(request).await?;
        self.invalidate();

        expect_status(response, 201, RETRY_MESSAGE)?.decode()
    }

    pub async fn get_reply(&self, id: u64) -> Result<Reply, ApiError> {
        let reply = self
            .session
            .authenticated_request(ApiRequest::get(format!("/mail/reply/manage/{}", id)))
            .await?;

        expect_status(reply, 200, RETRY_MESSAGE)?.decode()
    }

    /// Replies in the thread of mail `mail_id`.
    pub async fn replies(&self, mail_id: u64) -> Result<Vec<Reply>, ApiError> {
        self.session
            .authenticated_request(ApiRequest::get(format!("/mail/replies/{}", mail_id)))
            .await?
            .decode()
    }

    /// Flip the archived flag of a conversation, given its current state.
    pub async fn toggle_archive(&self, id: u64, archived: bool) -> Result<String, ApiError> {
        let request = ApiRequest::put(StarTarget::Mail.manage_path(id))
            .json(&json!({ "archived": !archived }))?;
        let reply = self.session.authenticated_request(request).await?;
        self.invalidate();

        expect_status(reply, 200, UNKNOWN_MESSAGE)?;
        Ok(if archived {
            "Conversation removed from archive.".to_string()
        } else {
            "Conversation archived.".to_string()
        })
    }

    /// Flip the starred flag of a mail or reply, given its current state.
    pub async fn toggle_star(
        &self,
        target: StarTarget,
        id: u64,
        starred: bool,
    ) -> Result<(), ApiError> {
        let request = ApiRequest::put(target.manage_path(id)).json(&json!({ "starred": !starred }))?;
        let reply = self.session.authenticated_request(request).await?;
        self.invalidate();

        expect_status(reply, 200, UNKNOWN_MESSAGE)?;
        Ok(())
    }

    /// Delete a mail. Deleting one that is already gone also succeeds.
    pub async fn delete_mail(&self, id: u64) -> Result<String, ApiError> {
        let result = self
            .session
            .authenticated_request(ApiRequest::delete(StarTarget::Mail.manage_path(id)))
            .await;
        self.invalidate();

        match result {
            Ok(reply) => {
                expect_status(reply, 204, UNKNOWN_MESSAGE)?;
                Ok("Mail was deleted.".to_string())
            }
            Err(ApiError::Server { status: 404, .. }) => Ok("Mail was already deleted.".to_string()),
            Err(e) => Err(e),
        }
    }

    /// Address-book entries matching `query`.
    pub async fn contacts(&self, query: &str) -> Result<Vec<Contact>, ApiError> {
        self.session
            .authenticated_request(ApiRequest::get(CONTACTS_PATH).query("query", query))
            .await?
            .decode()
    }

    /// Autosave a draft being composed.
    ///
    /// A draft with any recipient, subject or body is stored (trimmed, with
    /// `is_draft` set). An emptied draft that was stored before is deleted.
    pub async fn save_draft(&self, draft: &MailDraft) -> Result<DraftSaved, ApiError> {
        if !draft.is_blank() {
            let mut draft = draft.trimmed();
            draft.is_draft = true;
            return self.create_mail(&draft).await.map(DraftSaved::Stored);
        }

        match draft.id {
            Some(id) => {
                self.delete_mail(id).await?;
                Ok(DraftSaved::Deleted)
            }
            None => Ok(DraftSaved::Skipped),
        }
    }

    fn invalidate(&self) {
        self.cache().invalidate();
    }

    fn cache(&self) -> MutexGuard<'_, MailboxCache> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.has_changed().unwrap_or(false) {
            debug!("Session changed to {:?}, dropping cached folders", *status.borrow_and_update());
            cache.invalidate();
        }

        cache
    }

    /// True when a sign-in or sign-out happened since the cache last looked.
    fn session_changed(&self) -> bool {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_changed()
            .unwrap_or(false)
    }
}

/// Loose shape check for a typed address: `local@domain.tld`, no spaces.
pub fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    let Some((name, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    let clean = |part: &str| !part.is_empty() && !part.contains(char::is_whitespace) && !part.contains('@');
    clean(local) && clean(name) && clean(tld)
}
