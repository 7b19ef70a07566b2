//! Application state owned by the UI shell.
//!
//! [`AppState`] ties configuration, remote services, the local session store
//! and the event sink together, and turns failed actions into user alerts.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use fieldreport_shared::types::{Report, ReportId};
use fieldreport_shared::ReportError;
use fieldreport_store::{Database, StoreError};

use crate::auth;
use crate::backend::Services;
use crate::config::{ClientConfig, ConfigError};
use crate::events::{self, ReportSubmittedPayload, EVENT_REPORT_SUBMITTED};
use crate::report_detail::ReportDetailView;
use crate::report_list::{ListMode, ReportListView};
use crate::session::SessionContext;
use crate::submit::ReportForm;

/// Receives `(event name, JSON payload)` pairs destined for the UI.
pub type EventSink = Arc<dyn Fn(&str, serde_json::Value) + Send + Sync>;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session store: {0}")]
    Store(#[from] StoreError),
}

pub struct AppState {
    pub config: ClientConfig,
    pub services: Services,
    /// Local session store.
    pub database: Database,
    pub session: SessionContext,
    sink: EventSink,
}

impl AppState {
    pub fn new(
        config: ClientConfig,
        services: Services,
        database: Database,
        sink: EventSink,
    ) -> Result<Self, StoreError> {
        let session = SessionContext::load(&database)?;
        Ok(Self {
            config,
            services,
            database,
            session,
            sink,
        })
    }

    /// Build every collaborator from configuration and restore the session.
    pub fn from_config(config: ClientConfig, sink: EventSink) -> Result<Self, StartupError> {
        let services = Services::from_config(&config)?;
        let database = config.open_session_db()?;
        let state = Self::new(config, services, database, sink)?;
        info!(signed_in = state.session.is_signed_in(), "client state ready");
        Ok(state)
    }

    pub async fn sign_in(&mut self, phone: &str) -> Result<(), ReportError> {
        match auth::sign_in(&*self.services.profiles, &self.database, phone).await {
            Ok(session) => {
                self.session = session;
                Ok(())
            }
            Err(e) => Err(self.alert(e)),
        }
    }

    pub fn sign_out(&mut self) {
        auth::sign_out(&mut self.session, &self.database);
    }

    pub fn report_list(&self, mode: ListMode) -> ReportListView {
        ReportListView::mount(&self.services, self.session.clone(), mode)
    }

    pub fn report_detail(&self, id: ReportId) -> ReportDetailView {
        ReportDetailView::mount(&self.services, id)
    }

    pub fn new_form(&self) -> ReportForm {
        ReportForm::new(self.config.submission_policy())
    }

    pub async fn submit(&self, form: &mut ReportForm) -> Result<Report, ReportError> {
        match form.submit(&self.services, &self.session).await {
            Ok(report) => {
                events::emit_event(
                    &*self.sink,
                    EVENT_REPORT_SUBMITTED,
                    ReportSubmittedPayload {
                        id: report.id.to_string(),
                        category: report.category.clone(),
                        has_image: report.image.is_some(),
                    },
                );
                Ok(report)
            }
            Err(e) => Err(self.alert(e)),
        }
    }

    /// Show `err` to the user and hand it back.
    pub fn alert(&self, err: ReportError) -> ReportError {
        events::alert(&*self.sink, &err);
        err
    }
}
