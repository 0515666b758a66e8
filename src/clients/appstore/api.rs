//! App Store Connect REST boundary.
//!
//! The trait is the seam the handler unit and the invite workflow program
//! against; [`HttpAppStoreApi`] is the reqwest implementation. Anything
//! beyond request construction and JSON field mapping (token minting,
//! retries) lives outside the daemon.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::config::AppStoreConfig;

use super::model::{
    App, AppAttributes, BetaGroup, BetaGroupAttributes, BetaTester, BetaTesterAttributes,
    InvitationAttributes, ListEnvelope, ResourceObject, TeamMember, UserAttributes,
    UserInvitation,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The resource already exists (HTTP 409 or an ENTITY_ALREADY_EXISTS
    /// error body). The invite workflow treats this as idempotent success.
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("App Store Connect returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("report decode failed: {0}")]
    Decode(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Filter set for the `salesReports` endpoint.
pub struct SalesReportQuery {
    pub vendor_number: String,
    /// `SALES`, `SUBSCRIPTION`, `NEWSSTAND`, ...
    pub report_type: String,
    /// `SUMMARY`, `DETAILED`, ...
    pub report_subtype: String,
    /// `DAILY`, `WEEKLY`, `MONTHLY`, `YEARLY`.
    pub frequency: String,
    /// `YYYY-MM-DD` (or `YYYY-MM` for monthly). Empty means "latest daily".
    pub report_date: String,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait AppStoreApi: Send + Sync {
    async fn list_team_members(&self) -> Result<Vec<TeamMember>, ApiError>;
    async fn list_invitations(&self) -> Result<Vec<UserInvitation>, ApiError>;
    async fn invite_user(
        &self,
        email: &str,
        first_name: &str,
        roles: &[String],
        visible_app_ids: &[String],
    ) -> Result<(), ApiError>;
    async fn remove_user(&self, user_id: &str) -> Result<(), ApiError>;
    async fn list_apps(&self) -> Result<Vec<App>, ApiError>;
    async fn find_app_by_name(&self, name: &str) -> Result<Option<App>, ApiError>;
    async fn list_beta_groups(&self, app_id: &str) -> Result<Vec<BetaGroup>, ApiError>;
    async fn list_beta_testers_in_group(&self, group_id: &str) -> Result<Vec<BetaTester>, ApiError>;
    async fn add_beta_tester(
        &self,
        email: &str,
        first_name: &str,
        group_id: &str,
    ) -> Result<(), ApiError>;
    /// Remove a tester from TestFlight entirely. Returns `false` when no
    /// tester with that email exists.
    async fn remove_beta_tester(&self, email: &str) -> Result<bool, ApiError>;

    /// Fetch a sales/trends report as decompressed CSV text.
    async fn sales_report(&self, query: &SalesReportQuery) -> Result<String, ApiError>;

    /// Fetch a monthly finance report (`YYYY-MM`) as decompressed CSV text.
    /// `region_code` is `ZZ` for the worldwide report.
    async fn finance_report(
        &self,
        vendor_number: &str,
        region_code: &str,
        report_date: &str,
    ) -> Result<String, ApiError>;

    /// Case-insensitive team membership lookup.
    async fn find_team_member(&self, email: &str) -> Result<Option<TeamMember>, ApiError> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .list_team_members()
            .await?
            .into_iter()
            .find(|m| m.email.to_lowercase() == needle))
    }
}

// ─── HTTP implementation ─────────────────────────────────────────────────────

pub struct HttpAppStoreApi {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpAppStoreApi {
    pub fn new(http: reqwest::Client, config: &AppStoreConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || detail.contains("ENTITY_ALREADY_EXISTS") {
            return Err(ApiError::Conflict(detail));
        }
        Err(ApiError::Status { status, detail })
    }

    async fn get(&self, endpoint: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(self.url(endpoint))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn get_with_query(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(self.url(endpoint))
            .query(query)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn post(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await?;
        Self::check(response).await
    }
}

/// The report endpoints answer with gzip-compressed CSV rather than JSON.
fn gunzip(bytes: &[u8]) -> Result<String, ApiError> {
    use std::io::Read;

    let mut csv = String::new();
    flate2::read::GzDecoder::new(bytes)
        .read_to_string(&mut csv)
        .map_err(|e| ApiError::Decode(format!("not gzipped CSV: {e}")))?;
    Ok(csv)
}

#[async_trait]
impl AppStoreApi for HttpAppStoreApi {
    async fn list_team_members(&self) -> Result<Vec<TeamMember>, ApiError> {
        let envelope: ListEnvelope<ResourceObject<UserAttributes>> =
            self.get("users").await?.json().await?;
        Ok(envelope.data.into_iter().map(TeamMember::from_object).collect())
    }

    async fn list_invitations(&self) -> Result<Vec<UserInvitation>, ApiError> {
        let envelope: ListEnvelope<ResourceObject<InvitationAttributes>> =
            self.get("userInvitations").await?.json().await?;
        Ok(envelope
            .data
            .into_iter()
            .map(UserInvitation::from_object)
            .collect())
    }

    async fn invite_user(
        &self,
        email: &str,
        first_name: &str,
        roles: &[String],
        visible_app_ids: &[String],
    ) -> Result<(), ApiError> {
        let body = json!({
            "data": {
                "type": "userInvitations",
                "attributes": {
                    "email": email,
                    "firstName": first_name,
                    // Connect requires a last name; invitees fix it on accept.
                    "lastName": "peropero",
                    "roles": roles,
                    "allAppsVisible": false,
                },
                "relationships": {
                    "visibleApps": {
                        "data": visible_app_ids.iter()
                            .map(|id| json!({ "type": "apps", "id": id }))
                            .collect::<Vec<_>>()
                    }
                }
            }
        });
        self.post("userInvitations", &body).await?;
        Ok(())
    }

    async fn remove_user(&self, user_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("users/{user_id}")))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_apps(&self) -> Result<Vec<App>, ApiError> {
        let envelope: ListEnvelope<ResourceObject<AppAttributes>> =
            self.get("apps").await?.json().await?;
        Ok(envelope.data.into_iter().map(App::from_object).collect())
    }

    async fn find_app_by_name(&self, name: &str) -> Result<Option<App>, ApiError> {
        let envelope: ListEnvelope<ResourceObject<AppAttributes>> = self
            .get(&format!("apps?filter[name]={name}"))
            .await?
            .json()
            .await?;
        Ok(envelope
            .data
            .into_iter()
            .map(App::from_object)
            .find(|app| app.name.eq_ignore_ascii_case(name)))
    }

    async fn list_beta_groups(&self, app_id: &str) -> Result<Vec<BetaGroup>, ApiError> {
        let envelope: ListEnvelope<ResourceObject<BetaGroupAttributes>> = self
            .get(&format!("apps/{app_id}/betaGroups"))
            .await?
            .json()
            .await?;
        Ok(envelope.data.into_iter().map(BetaGroup::from_object).collect())
    }

    async fn list_beta_testers_in_group(&self, group_id: &str) -> Result<Vec<BetaTester>, ApiError> {
        let envelope: ListEnvelope<ResourceObject<BetaTesterAttributes>> = self
            .get_with_query(
                &format!("betaGroups/{group_id}/betaTesters"),
                &[
                    ("fields[betaTesters]", "email,firstName,lastName,state"),
                    ("limit", "200"),
                ],
            )
            .await?
            .json()
            .await?;
        Ok(envelope.data.into_iter().map(BetaTester::from_object).collect())
    }

    async fn add_beta_tester(
        &self,
        email: &str,
        first_name: &str,
        group_id: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "data": {
                "type": "betaTesters",
                "attributes": {
                    "email": email,
                    "firstName": first_name,
                },
                "relationships": {
                    "betaGroups": {
                        "data": [{ "type": "betaGroups", "id": group_id }]
                    }
                }
            }
        });
        self.post("betaTesters", &body).await?;
        Ok(())
    }

    async fn remove_beta_tester(&self, email: &str) -> Result<bool, ApiError> {
        let envelope: ListEnvelope<ResourceObject<BetaTesterAttributes>> = self
            .get(&format!("betaTesters?filter[email]={email}"))
            .await?
            .json()
            .await?;
        let Some(tester) = envelope
            .data
            .into_iter()
            .map(BetaTester::from_object)
            .find(|t| t.email.eq_ignore_ascii_case(email))
        else {
            return Ok(false);
        };

        let response = self
            .http
            .delete(self.url(&format!("betaTesters/{}", tester.id)))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(true)
    }

    async fn sales_report(&self, query: &SalesReportQuery) -> Result<String, ApiError> {
        let mut filters = vec![
            ("filter[frequency]", query.frequency.as_str()),
            ("filter[reportSubType]", query.report_subtype.as_str()),
            ("filter[reportType]", query.report_type.as_str()),
            ("filter[vendorNumber]", query.vendor_number.as_str()),
        ];
        if !query.report_date.is_empty() {
            filters.push(("filter[reportDate]", query.report_date.as_str()));
        }
        let bytes = self
            .get_with_query("salesReports", &filters)
            .await?
            .bytes()
            .await?;
        gunzip(&bytes)
    }

    async fn finance_report(
        &self,
        vendor_number: &str,
        region_code: &str,
        report_date: &str,
    ) -> Result<String, ApiError> {
        let bytes = self
            .get_with_query(
                "financeReports",
                &[
                    ("filter[regionCode]", region_code),
                    ("filter[reportDate]", report_date),
                    ("filter[reportType]", "FINANCIAL"),
                    ("filter[vendorNumber]", vendor_number),
                ],
            )
            .await?
            .bytes()
            .await?;
        gunzip(&bytes)
    }
}
