//! REST access to the hosted backend's tables.
//!
//! The backend exposes each table under `/rest/v1/<table>` with PostgREST
//! query syntax (`column=eq.value`, `order=column.desc`). Every request carries
//! the project's anon key both as `apikey` and as a bearer token.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use fieldreport_shared::constants::{REPORTS_TABLE, USER_PROFILES_TABLE};
use fieldreport_shared::types::{NewReport, Report, ReportId, UserId, UserProfile};

use crate::error::{NetError, Result};

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        Self::with_http(reqwest::Client::new(), base_url, anon_key)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, anon_key: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(NetError::Config(format!(
                "backend URL must be http(s), got {}",
                base_url.scheme()
            )));
        }
        if anon_key.is_empty() {
            return Err(NetError::Config("anon key is empty".into()));
        }

        Ok(Self {
            http,
            base_url,
            anon_key: anon_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn table_url(&self, table: &str) -> String {
        self.endpoint(&format!("rest/v1/{table}"))
    }

    pub(crate) fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// All reports, newest first, optionally restricted to one owner.
    pub async fn select_reports(&self, owner: Option<&UserId>) -> Result<Vec<Report>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(uid) = owner {
            query.push(("user_id", format!("eq.{uid}")));
        }

        let req = self.http.get(self.table_url(REPORTS_TABLE)).query(&query);
        let reports: Vec<Report> = decode_json(send(self.authed(req)).await?).await?;

        debug!(count = reports.len(), scoped = owner.is_some(), "fetched reports");
        Ok(reports)
    }

    pub async fn get_report(&self, id: &ReportId) -> Result<Option<Report>> {
        let req = self.http.get(self.table_url(REPORTS_TABLE)).query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{id}")),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<Report> = decode_json(send(self.authed(req)).await?).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one report and return the row as stored (with `id` and `created_at`).
    pub async fn insert_report(&self, report: &NewReport) -> Result<Report> {
        let req = self
            .http
            .post(self.table_url(REPORTS_TABLE))
            .header("Prefer", "return=representation")
            .json(report);
        let rows: Vec<Report> = decode_json(send(self.authed(req)).await?).await?;

        let stored = rows
            .into_iter()
            .next()
            .ok_or_else(|| NetError::Decode("insert returned no rows".into()))?;
        debug!(id = %stored.id, "inserted report");
        Ok(stored)
    }

    pub async fn find_profile_by_phone(&self, phone: &str) -> Result<Option<UserProfile>> {
        let req = self.http.get(self.table_url(USER_PROFILES_TABLE)).query(&[
            ("select", "*".to_string()),
            ("phone", format!("eq.{phone}")),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<UserProfile> = decode_json(send(self.authed(req)).await?).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_profile(&self, phone: &str) -> Result<UserProfile> {
        let req = self
            .http
            .post(self.table_url(USER_PROFILES_TABLE))
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "phone": phone }));
        let rows: Vec<UserProfile> = decode_json(send(self.authed(req)).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| NetError::Decode("profile insert returned no rows".into()))
    }

    pub async fn find_or_create_profile(&self, phone: &str) -> Result<UserProfile> {
        if let Some(profile) = self.find_profile_by_phone(phone).await? {
            return Ok(profile);
        }
        debug!("no profile for phone, creating one");
        self.create_profile(phone).await
    }
}

/// Send a request and turn non-2xx responses into [`NetError::Status`].
pub(crate) async fn send(req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(NetError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}
