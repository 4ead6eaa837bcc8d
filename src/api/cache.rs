//! Mailbox listing cache with time-to-live (TTL) support.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use super::models::Mail;

/// A mailbox listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
}

impl Folder {
    pub const ALL: [Folder; 3] = [Self::Inbox, Self::Sent, Self::Drafts];

    /// Endpoint that lists the folder.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Inbox => "/mail/inbox/",
            Self::Sent => "/mail/sent/",
            Self::Drafts => "/mail/drafts/",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
        }
    }
}

/// Cached data with timestamp.
#[derive(Debug, Clone)]
struct CachedData<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

/// Per-folder cache of mail listings.
#[derive(Debug, Clone)]
pub struct MailboxCache {
    ttl: Duration,
    folders: HashMap<Folder, CachedData<Vec<Mail>>>,
}

impl MailboxCache {
    /// Create an empty cache whose entries expire after `ttl`.
    pub fn new(ttl: StdDuration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(365)),
            folders: HashMap::new(),
        }
    }

    /// Get a cached listing if still valid.
    pub fn get(&self, folder: Folder) -> Option<&Vec<Mail>> {
        self.folders
            .get(&folder)
            .filter(|cached| self.is_valid(&cached.cached_at))
            .map(|cached| &cached.data)
    }

    pub fn set(&mut self, folder: Folder, mails: Vec<Mail>) {
        self.folders.insert(
            folder,
            CachedData {
                data: mails,
                cached_at: Utc::now(),
            },
        );
    }

    /// When `folder` was last fetched.
    pub fn cached_at(&self, folder: Folder) -> Option<DateTime<Utc>> {
        self.folders.get(&folder).map(|c| c.cached_at)
    }

    /// Drop every listing.
    pub fn invalidate(&mut self) {
        self.folders.clear();
    }

    fn is_valid(&self, cached_at: &DateTime<Utc>) -> bool {
        Utc::now() - *cached_at < self.ttl
    }

    /// Check if `folder` needs to be fetched again.
    pub fn needs_refresh(&self, folder: Folder) -> bool {
        self.get(folder).is_none()
    }
}
