//! Records exchanged with the mail and console API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The authenticated identity, as returned by `/user/manage/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    pub username: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationRef>,
}

impl Profile {
    /// Get the best available display name.
    pub fn display_name(&self) -> String {
        let full = match &self.last_name {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        };
        let full = full.trim();

        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    /// Id of the organization this user belongs to, if any.
    pub fn organization_id(&self) -> Option<u64> {
        self.organization.as_ref().and_then(OrganizationRef::id)
    }
}

/// An organization embedded in another record: either its id or its details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrganizationRef {
    Id(u64),
    Details(Box<Organization>),
}

impl OrganizationRef {
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Details(org) => org.id,
        }
    }
}

/// Fields for `/user/create/`.
#[derive(Clone, PartialEq, Serialize)]
pub struct NewAccount {
    pub username: String,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<u64>,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .field("organization", &self.organization)
            .finish()
    }
}

/// Kind of organization, as offered during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationType {
    Corporate,
    Nonprofit,
    Educational,
    Government,
    Healthcare,
    Tech,
    Financial,
    Retail,
    Media,
    Freelancer,
    Cooperative,
    Religious,
    #[serde(other)]
    Other,
}

impl OrganizationType {
    pub const ALL: [OrganizationType; 12] = [
        Self::Corporate,
        Self::Nonprofit,
        Self::Educational,
        Self::Government,
        Self::Healthcare,
        Self::Tech,
        Self::Financial,
        Self::Retail,
        Self::Media,
        Self::Freelancer,
        Self::Cooperative,
        Self::Religious,
    ];

    /// Wire name of the type.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Corporate => "CORPORATE",
            Self::Nonprofit => "NONPROFIT",
            Self::Educational => "EDUCATIONAL",
            Self::Government => "GOVERNMENT",
            Self::Healthcare => "HEALTHCARE",
            Self::Tech => "TECH",
            Self::Financial => "FINANCIAL",
            Self::Retail => "RETAIL",
            Self::Media => "MEDIA",
            Self::Freelancer => "FREELANCER",
            Self::Cooperative => "COOPERATIVE",
            Self::Religious => "RELIGIOUS",
            Self::Other => "OTHER",
        }
    }

    /// Human-readable description.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Corporate => "Corporate Entity (Business)",
            Self::Nonprofit => "Nonprofits and Charities",
            Self::Educational => "Educational Institution",
            Self::Government => "Government or Public Sector",
            Self::Healthcare => "Healthcare Organization",
            Self::Tech => "Technology Firm",
            Self::Financial => "Financial Institution",
            Self::Retail => "Retail and E-commerce",
            Self::Media => "Media and Entertainment",
            Self::Freelancer => "Freelance or Individual Professionals",
            Self::Cooperative => "Cooperate or Member-based Organization",
            Self::Religious => "Religious Organization",
            Self::Other => "Other",
        }
    }
}

impl std::str::FromStr for OrganizationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == wanted)
            .ok_or_else(|| format!("Unknown organization type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub domains: Vec<Domain>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Box<Profile>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_type: Option<OrganizationType>,
}

impl Organization {
    /// Domains whose ownership has been confirmed.
    pub fn verified_domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.iter().filter(|d| d.is_verified.unwrap_or(false))
    }
}

/// Body for `/organization/create/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrganization {
    pub name: String,
    pub organization_type: OrganizationType,
    pub domains: Vec<NewDomain>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDomain {
    pub name: String,
}

/// A mail domain owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<Box<Profile>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mxrecord: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain_stripping: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_all_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// How domain ownership is proven in DNS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethod {
    /// TXT record on the apex (recommended).
    Txt,
    /// CNAME record on `verify.<domain>`.
    Cname,
}

/// A DNS record the domain owner has to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub kind: &'static str,
    pub host: &'static str,
    pub value: String,
}

/// The record proving ownership of `domain` under the given verification zone.
///
/// The TXT value is the first ten hex digits of SHA-256 of the domain name
/// prefixed to the zone.
pub fn verification_record(domain: &str, method: VerificationMethod, zone: &str) -> DnsRecord {
    let zone = zone.trim_end_matches('.');
    match method {
        VerificationMethod::Txt => {
            let digest = Sha256::digest(domain.as_bytes());
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            DnsRecord {
                kind: "TXT",
                host: "@",
                value: format!("{}.{}", &hex[..10], zone),
            }
        }
        VerificationMethod::Cname => DnsRecord {
            kind: "CNAME",
            host: "verify",
            value: format!("{}.", zone),
        },
    }
}

/// A mail or draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Profile>,

    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default)]
    pub cc: Vec<String>,

    #[serde(default)]
    pub bcc: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default)]
    pub read: bool,

    #[serde(default)]
    pub is_draft: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub edited: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,

    #[serde(default)]
    pub starred: bool,

    #[serde(default)]
    pub archived: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl Mail {
    pub fn subject_or_placeholder(&self) -> &str {
        match self.subject.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => "No subject",
        }
    }

    /// When the mail was sent, or created for drafts.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if self.is_draft {
            self.created_at
        } else {
            self.sent_at.or(self.created_at)
        }
    }
}

/// Body for `/mail/create/`; also used to save drafts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MailDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub recipients: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub is_draft: bool,
}

impl MailDraft {
    /// True when there is nothing worth keeping as a draft.
    pub fn is_blank(&self) -> bool {
        self.recipients.iter().all(|r| r.trim().is_empty())
            && self.subject.trim().is_empty()
            && self.body.trim().is_empty()
    }

    /// Copy with surrounding whitespace removed from subject and body.
    pub fn trimmed(&self) -> Self {
        Self {
            subject: self.subject.trim().to_string(),
            body: self.body.trim().to_string(),
            ..self.clone()
        }
    }
}

/// A reply in a mail thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub mail: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reply: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Profile>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub is_read: bool,
}

/// Body for `/mail/reply/create/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReply {
    pub mail: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_reply: Option<u64>,
    pub body: String,
}

/// An address-book entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default, rename = "Profile", skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}
