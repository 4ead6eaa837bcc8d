//! Command-line interface.

use chrono::{Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use mailconsole::api::format::{format_duration, format_mail_date};
use mailconsole::api::mail::is_valid_address;
use mailconsole::api::models::{
    Mail, MailDraft, NewAccount, NewDomain, NewOrganization, NewReply, OrganizationType,
    VerificationMethod,
};
use mailconsole::api::{ConsoleClient, DraftSaved, Folder, MailClient, StarTarget};
use mailconsole::notify::Notifier;
use mailconsole::{AppError, Config, SessionManager};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session.
    Login {
        username: String,
        #[arg(long, env = "MAILCONSOLE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account (does not sign in).
    Signup {
        username: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Id of the organization to join.
        #[arg(long)]
        organization: Option<u64>,
        #[arg(long, env = "MAILCONSOLE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// End the session and forget stored credentials.
    Logout,
    /// Show the signed-in profile.
    Whoami,
    /// Rotate the token pair now.
    Refresh,
    /// List received mail.
    Inbox(ListArgs),
    /// List sent mail.
    Sent(ListArgs),
    /// List drafts.
    Drafts(ListArgs),
    /// Show one mail, optionally with its replies.
    Read {
        id: u64,
        #[arg(long)]
        replies: bool,
    },
    /// Send a mail, or save it as a draft.
    Send {
        #[arg(long = "to", required_unless_present = "draft")]
        recipients: Vec<String>,
        #[arg(long)]
        cc: Vec<String>,
        #[arg(long)]
        bcc: Vec<String>,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Save as a draft instead of sending.
        #[arg(long)]
        draft: bool,
        /// Existing draft to update.
        #[arg(long)]
        id: Option<u64>,
    },
    /// Reply to a mail.
    Reply {
        mail: u64,
        body: String,
        /// Reply being answered, within the thread.
        #[arg(long)]
        parent: Option<u64>,
    },
    /// Archive a conversation, or restore it with --undo.
    Archive {
        id: u64,
        #[arg(long)]
        undo: bool,
    },
    /// Star a mail or reply, or remove the star with --undo.
    Star {
        id: u64,
        #[arg(long)]
        reply: bool,
        #[arg(long)]
        undo: bool,
    },
    /// Delete a mail.
    Delete { id: u64 },
    /// Search the address book.
    Contacts { query: String },
    /// Show an organization, or your own when no id is given.
    Org { id: Option<u64> },
    /// Create an organization.
    CreateOrg {
        name: String,
        #[arg(long = "type", value_parser = parse_organization_type)]
        organization_type: OrganizationType,
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    /// List the members of an organization.
    Members { id: u64 },
    /// Show the DNS record that proves ownership of a domain.
    DnsRecord {
        domain: String,
        #[arg(long, value_enum, default_value_t = Method::Txt)]
        method: Method,
    },
    /// Ask the server to verify a domain's DNS record.
    VerifyDomain { domain: String },
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Print raw JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Method {
    Txt,
    Cname,
}

impl From<Method> for VerificationMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Txt => VerificationMethod::Txt,
            Method::Cname => VerificationMethod::Cname,
        }
    }
}

fn parse_organization_type(s: &str) -> Result<OrganizationType, String> {
    s.parse()
}

fn require_password(password: Option<String>) -> Result<String, AppError> {
    password.filter(|p| !p.is_empty()).ok_or_else(|| {
        AppError::Config("Password required: pass --password or set MAILCONSOLE_PASSWORD".into())
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Config(format!("Failed to render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn print_listing(mails: &[Mail]) {
    let now = Utc::now().with_timezone(&Local);
    for mail in mails {
        let when = mail
            .timestamp()
            .map(|t| format_mail_date(&t.with_timezone(&Local), &now))
            .unwrap_or_default();
        let marker = match (mail.read, mail.starred) {
            (_, true) => "*",
            (false, _) => "+",
            _ => " ",
        };
        println!(
            "{} {:>6}  {:<22}  {}",
            marker,
            mail.id.map(|id| id.to_string()).unwrap_or_default(),
            when,
            mail.subject_or_placeholder()
        );
    }
}

fn check_addresses<'a>(addresses: impl IntoIterator<Item = &'a String>) -> Result<(), AppError> {
    match addresses.into_iter().find(|a| !is_valid_address(a.trim())) {
        Some(bad) => Err(AppError::Config(format!("Invalid email address: {}", bad))),
        None => Ok(()),
    }
}

/// Run one command against the configured backend.
pub async fn run(command: Command, config: &Config, notifier: Notifier) -> Result<(), AppError> {
    let session = SessionManager::from_config(config, notifier)
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;
    let mail = MailClient::new(session.clone(), config.mailbox_ttl());
    let console = ConsoleClient::new(session.clone(), config.console.verification_zone.clone());

    match command {
        Command::Login { username, password } => {
            let password = require_password(password)?;
            session.login(&username, &password).await?;
            let profile = session.fetch_profile().await?;
            println!("Signed in as {}", profile.display_name());
        }
        Command::Signup {
            username,
            first_name,
            last_name,
            phone,
            organization,
            password,
        } => {
            let account = NewAccount {
                username,
                first_name,
                last_name,
                password: require_password(password)?,
                phone_number: phone,
                organization,
            };
            let profile = session.signup(&account).await?;
            println!("Account {} created. You can now log in.", profile.username);
        }
        Command::Logout => {
            session.logout().await;
            println!("Signed out");
        }
        Command::Whoami => {
            let profile = session.fetch_profile().await?;
            print_json(&profile)?;
        }
        Command::Refresh => {
            session.refresh_access_token().await?;
            if let Some(rotated) = session.rotated_at() {
                println!(
                    "Session refreshed ({} ago)",
                    format_duration(Utc::now() - rotated)
                );
            }
        }
        Command::Inbox(args) => list(&mail, Folder::Inbox, args).await?,
        Command::Sent(args) => list(&mail, Folder::Sent, args).await?,
        Command::Drafts(args) => list(&mail, Folder::Drafts, args).await?,
        Command::Read { id, replies } => {
            let found = mail.get_mail(id).await?;
            print_json(&found)?;
            if replies {
                print_json(&mail.replies(id).await?)?;
            }
        }
        Command::Send {
            recipients,
            cc,
            bcc,
            subject,
            body,
            draft,
            id,
        } => {
            check_addresses(recipients.iter().chain(&cc).chain(&bcc))?;
            let composed = MailDraft {
                id,
                recipients,
                cc,
                bcc,
                subject,
                body,
                is_draft: draft,
            };

            if draft {
                match mail.save_draft(&composed).await? {
                    DraftSaved::Stored(saved) => print_json(&saved)?,
                    DraftSaved::Deleted => println!("Draft discarded"),
                    DraftSaved::Skipped => println!("Nothing to save"),
                }
            } else {
                print_json(&mail.create_mail(&composed.trimmed()).await?)?;
            }
        }
        Command::Reply { mail: id, body, parent } => {
            let reply = mail
                .create_reply(&NewReply {
                    mail: id,
                    parent_reply: parent,
                    body,
                })
                .await?;
            print_json(&reply)?;
        }
        Command::Archive { id, undo } => {
            println!("{}", mail.toggle_archive(id, undo).await?);
        }
        Command::Star { id, reply, undo } => {
            let target = if reply { StarTarget::Reply } else { StarTarget::Mail };
            mail.toggle_star(target, id, undo).await?;
            println!("{}", if undo { "Star removed" } else { "Starred" });
        }
        Command::Delete { id } => {
            println!("{}", mail.delete_mail(id).await?);
        }
        Command::Contacts { query } => {
            print_json(&mail.contacts(&query).await?)?;
        }
        Command::Org { id: Some(id) } => {
            print_json(&console.organization(id).await?)?;
        }
        Command::Org { id: None } => match console.my_organization().await? {
            Some(organization) => print_json(&organization)?,
            None => println!("You are not a member of an organization"),
        },
        Command::CreateOrg {
            name,
            organization_type,
            domains,
        } => {
            let organization = NewOrganization {
                name,
                organization_type,
                domains: domains.into_iter().map(|name| NewDomain { name }).collect(),
            };
            print_json(&console.create_organization(&organization).await?)?;
        }
        Command::Members { id } => {
            print_json(&console.members(id).await?)?;
        }
        Command::DnsRecord { domain, method } => {
            let record = console.verification_record(&domain, method.into());
            println!("Type:  {}", record.kind);
            println!("Host:  {}", record.host);
            println!("Value: {}", record.value);
        }
        Command::VerifyDomain { domain } => {
            console.verify_domain(&domain).await?;
            println!("Domain {} verified", domain);
        }
    }

    Ok(())
}

async fn list(mail: &MailClient, folder: Folder, args: ListArgs) -> Result<(), AppError> {
    let mails = mail.folder(folder).await?;

    if args.json {
        print_json(&mails)
    } else {
        if mails.is_empty() {
            println!("No mail in {}", folder.label());
        }
        print_listing(&mails);
        Ok(())
    }
}
