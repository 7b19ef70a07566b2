//! Seams between the report flows and the remote services.
//!
//! Each trait covers one external collaborator. The hosted backend implements
//! all of them through [`BackendClient`]; tests substitute in-memory fakes.
//! Remote failures are mapped into the user-facing [`ReportError`] taxonomy
//! here, where the failing operation is known.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use fieldreport_net::{BackendClient, ChangeFilter, CompletionClient, NetError, Subscription};
use fieldreport_shared::constants::{REPORTS_BUCKET, REPORTS_TABLE};
use fieldreport_shared::types::{NewReport, Report, ReportId, Scope, UserProfile};
use fieldreport_shared::ReportError;

use crate::config::{ClientConfig, ConfigError};
use crate::instructions::Completer;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Reports visible in `scope`, newest first.
    async fn fetch_reports(&self, scope: &Scope) -> Result<Vec<Report>, ReportError>;

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, ReportError>;

    async fn insert_report(&self, report: &NewReport) -> Result<Report, ReportError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile(&self, phone: &str) -> Result<Option<UserProfile>, ReportError>;

    async fn find_or_create_profile(&self, phone: &str) -> Result<UserProfile, ReportError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object and return its public URL.
    async fn upload(&self, name: &str, data: Vec<u8>, content_type: &str)
        -> Result<String, ReportError>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a live feed of report changes for `scope`.
    async fn subscribe(&self, scope: &Scope) -> Result<Subscription, ReportError>;
}

fn fetch_err(e: NetError) -> ReportError {
    ReportError::Fetch(e.to_string())
}

#[async_trait]
impl ReportStore for BackendClient {
    async fn fetch_reports(&self, scope: &Scope) -> Result<Vec<Report>, ReportError> {
        self.select_reports(scope.user_id()).await.map_err(fetch_err)
    }

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, ReportError> {
        self.get_report(id).await.map_err(fetch_err)
    }

    async fn insert_report(&self, report: &NewReport) -> Result<Report, ReportError> {
        BackendClient::insert_report(self, report)
            .await
            .map_err(|e| ReportError::Insert(e.to_string()))
    }
}

#[async_trait]
impl ProfileStore for BackendClient {
    async fn find_profile(&self, phone: &str) -> Result<Option<UserProfile>, ReportError> {
        self.find_profile_by_phone(phone).await.map_err(fetch_err)
    }

    async fn find_or_create_profile(&self, phone: &str) -> Result<UserProfile, ReportError> {
        BackendClient::find_or_create_profile(self, phone)
            .await
            .map_err(fetch_err)
    }
}

/// Object storage bound to one bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    client: BackendClient,
    name: String,
}

impl Bucket {
    pub fn new(client: BackendClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for Bucket {
    async fn upload(
        &self,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ReportError> {
        self.client
            .upload_object(&self.name, name, data, content_type)
            .await
            .map_err(|e| ReportError::Upload(e.to_string()))
    }
}

/// Realtime feed of the `reports` table.
#[derive(Debug, Clone)]
pub struct RealtimeReports {
    client: BackendClient,
    heartbeat: Duration,
}

impl RealtimeReports {
    pub fn new(client: BackendClient, heartbeat: Duration) -> Self {
        Self { client, heartbeat }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeReports {
    async fn subscribe(&self, scope: &Scope) -> Result<Subscription, ReportError> {
        let mut filter = ChangeFilter::table(REPORTS_TABLE);
        if let Some(uid) = scope.user_id() {
            filter = filter.eq("user_id", uid);
        }
        self.client
            .subscribe_changes(&filter, self.heartbeat)
            .await
            .map_err(|e| {
                warn!(error = %e, "change feed subscription failed");
                fetch_err(e)
            })
    }
}

/// Every remote collaborator, built once from configuration.
#[derive(Clone)]
pub struct Services {
    pub reports: Arc<dyn ReportStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub completer: Arc<dyn Completer>,
}

impl Services {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let backend = BackendClient::new(&config.backend_url, &config.anon_key)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let completion = CompletionClient::new(
            config.completion_url.clone(),
            config.completion_model.clone(),
            config.completion_api_key.clone(),
        );

        Ok(Self {
            reports: Arc::new(backend.clone()),
            profiles: Arc::new(backend.clone()),
            objects: Arc::new(Bucket::new(backend.clone(), REPORTS_BUCKET)),
            feed: Arc::new(RealtimeReports::new(backend, config.heartbeat())),
            completer: Arc::new(completion),
        })
    }
}
