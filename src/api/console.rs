//! Organization console: organizations, members and domain verification.

use serde::Deserialize;
use tracing::{debug, info};

use super::expect_status;
use super::models::{
    verification_record, DnsRecord, NewOrganization, Organization, Profile, VerificationMethod,
};
use crate::auth::SessionManager;
use crate::error::ApiError;
use crate::transport::{ApiRequest, GENERIC_ERROR_MESSAGE};

const CREATE_PATH: &str = "/organization/create/";
const VERIFY_DOMAIN_PATH: &str = "/domain/verify/";

const VERIFICATION_FAILED_MESSAGE: &str = "Unknown error occurred during verification.";

/// The members endpoint answers with either shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum MembersBody {
    List(Vec<Profile>),
    Wrapped { members: Vec<Profile> },
}

impl From<MembersBody> for Vec<Profile> {
    fn from(body: MembersBody) -> Self {
        match body {
            MembersBody::List(members) | MembersBody::Wrapped { members } => members,
        }
    }
}

/// Console operations. Some endpoints are public, the rest need a session.
pub struct ConsoleClient {
    session: SessionManager,
    verification_zone: String,
}

impl ConsoleClient {
    pub fn new(session: SessionManager, verification_zone: impl Into<String>) -> Self {
        Self {
            session,
            verification_zone: verification_zone.into(),
        }
    }

    /// Full organization record, as seen by its members.
    pub async fn organization_details(&self, id: u64) -> Result<Organization, ApiError> {
        self.session
            .authenticated_request(ApiRequest::get(format!("/organization/{}/manage/", id)))
            .await?
            .decode()
    }

    /// Public organization record (used during onboarding).
    pub async fn organization(&self, id: u64) -> Result<Organization, ApiError> {
        self.session
            .public_request(ApiRequest::get(format!("/organization/{}/", id)))
            .await?
            .decode()
    }

    pub async fn members(&self, id: u64) -> Result<Vec<Profile>, ApiError> {
        let members: Vec<Profile> = self
            .session
            .authenticated_request(ApiRequest::get(format!("/organization/{}/members/", id)))
            .await?
            .decode::<MembersBody>()?
            .into();

        debug!("Organization {} has {} members", id, members.len());
        Ok(members)
    }

    pub async fn create_organization(
        &self,
        organization: &NewOrganization,
    ) -> Result<Organization, ApiError> {
        let request = ApiRequest::post(CREATE_PATH).json(organization)?;
        let reply = self.session.public_request(request).await?;

        let created: Organization = expect_status(reply, 201, GENERIC_ERROR_MESSAGE)?.decode()?;
        info!("Created organization {}", created.name);
        Ok(created)
    }

    /// Ask the server to check the DNS record for `domain`.
    pub async fn verify_domain(&self, domain: &str) -> Result<(), ApiError> {
        let request = ApiRequest::get(VERIFY_DOMAIN_PATH).query("domain", domain);

        match self.session.public_request(request).await {
            Ok(reply) => {
                expect_status(reply, 200, VERIFICATION_FAILED_MESSAGE)?;
                info!("Domain {} verified", domain);
                Ok(())
            }
            Err(ApiError::Server { status, message })
                if status != 404 && message == GENERIC_ERROR_MESSAGE =>
            {
                Err(ApiError::Server {
                    status,
                    message: VERIFICATION_FAILED_MESSAGE.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// The organization of the signed-in user, if they belong to one.
    pub async fn my_organization(&self) -> Result<Option<Organization>, ApiError> {
        let profile = self.session.ensure_profile().await?;

        let Some(id) = profile.organization_id() else {
            debug!("{} is not in an organization", profile.username);
            return Ok(None);
        };

        match self.organization_details(id).await {
            Ok(organization) => Ok(Some(organization)),
            Err(e) => {
                let message = match &e {
                    ApiError::Decode(_) => "Couldn't fetch organization details.".to_string(),
                    other => other.user_message(),
                };
                self.session.notifier().warn(message);
                Err(e)
            }
        }
    }

    /// The DNS record that proves ownership of `domain`.
    pub fn verification_record(&self, domain: &str, method: VerificationMethod) -> DnsRecord {
        verification_record(domain, method, &self.verification_zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{NewDomain, OrganizationType};
    use crate::store::CredentialPair;
    use crate::testing::{ok, unauthorized, Harness, ScriptedTransport};
    use crate::transport::ApiResponse;
    use serde_json::json;

    fn console(transport: ScriptedTransport) -> (ConsoleClient, Harness) {
        let h = Harness::new(transport, Some(CredentialPair::new("T1", "R1")));
        (ConsoleClient::new(h.session.clone(), "code4code.dev"), h)
    }

    #[tokio::test]
    async fn test_public_and_managed_organization() {
        let (console, h) = console(ScriptedTransport::new(|req, _| match req.path.as_str() {
            "/organization/3/" => ok(json!({"id": 3, "name": "Acme"})),
            "/organization/3/manage/" => ok(json!({
                "id": 3,
                "name": "Acme",
                "domains": [{"name": "acme.com", "is_verified": true}]
            })),
            _ => unauthorized(),
        }));

        assert_eq!(console.organization(3).await.unwrap().name, "Acme");
        let details = console.organization_details(3).await.unwrap();
        assert_eq!(details.verified_domains().count(), 1);

        let calls = h.transport.calls();
        assert_eq!(calls[0].bearer, None);
        assert_eq!(calls[1].bearer.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_members_accepts_both_shapes() {
        let (console, _h) = console(ScriptedTransport::new(|req, _| match req.path.as_str() {
            "/organization/1/members/" => ok(json!([{"username": "a@acme.com"}])),
            _ => ok(json!({"members": [{"username": "b@acme.com"}, {"username": "c@acme.com"}]})),
        }));

        assert_eq!(console.members(1).await.unwrap()[0].username, "a@acme.com");
        assert_eq!(console.members(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_organization() {
        let (console, h) = console(ScriptedTransport::new(|_, _| {
            ApiResponse::ok(201, json!({"id": 8, "name": "Acme", "organization_type": "TECH"}))
        }));

        let created = console
            .create_organization(&NewOrganization {
                name: "Acme".into(),
                organization_type: OrganizationType::Tech,
                domains: vec![NewDomain {
                    name: "acme.com".into(),
                }],
            })
            .await
            .unwrap();

        assert_eq!(created.id, Some(8));
        let call = &h.transport.calls_to(CREATE_PATH)[0];
        assert_eq!(call.bearer, None);
        assert_eq!(
            call.body,
            Some(json!({"name": "Acme", "organization_type": "TECH", "domains": [{"name": "acme.com"}]}))
        );
    }

    #[tokio::test]
    async fn test_verify_domain_outcomes() {
        let (console, h) = console(ScriptedTransport::new(|req, _| {
            let domain = req
                .query
                .iter()
                .find(|(k, _)| k == "domain")
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            match domain.as_str() {
                "acme.com" => ok(json!({"verified": true})),
                "missing.com" => ApiResponse::failure(404, "Domain not found"),
                "pending.com" => ApiResponse::ok(202, json!({})),
                _ => ApiResponse::failure(400, GENERIC_ERROR_MESSAGE),
            }
        }));

        console.verify_domain("acme.com").await.unwrap();
        let call = &h.transport.calls_to(VERIFY_DOMAIN_PATH)[0];
        assert_eq!(call.query, vec![("domain".to_string(), "acme.com".to_string())]);
        assert_eq!(call.bearer, None);

        let err = console.verify_domain("missing.com").await.unwrap_err();
        assert_eq!(err.user_message(), "Domain not found");

        let err = console.verify_domain("pending.com").await.unwrap_err();
        assert_eq!(err.user_message(), VERIFICATION_FAILED_MESSAGE);

        let err = console.verify_domain("broken.com").await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.user_message(), VERIFICATION_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_my_organization_follows_profile() {
        let (console, h) = console(ScriptedTransport::new(|req, _| match req.path.as_str() {
            "/user/manage/" => ok(json!({"username": "ada@acme.com", "organization": 3})),
            "/organization/3/manage/" => ok(json!({"id": 3, "name": "Acme"})),
            _ => unauthorized(),
        }));

        let org = console.my_organization().await.unwrap().unwrap();
        assert_eq!(org.name, "Acme");

        // Profile is cached after the first lookup.
        console.my_organization().await.unwrap();
        assert_eq!(h.transport.calls_to("/user/manage/").len(), 1);
    }

    #[tokio::test]
    async fn test_my_organization_without_membership() {
        let (console, h) = console(ScriptedTransport::new(|_, _| {
            ok(json!({"username": "solo@example.com"}))
        }));

        assert_eq!(console.my_organization().await.unwrap(), None);
        assert_eq!(h.transport.calls().len(), 1);
    }

    #[test]
    fn test_verification_record_uses_zone() {
        let h = Harness::new(ScriptedTransport::new(|_, _| unauthorized()), None);
        let console = ConsoleClient::new(h.session.clone(), "verify.example.net");

        let cname = console.verification_record("acme.com", VerificationMethod::Cname);
        assert_eq!(cname.value, "verify.example.net.");
    }
}
