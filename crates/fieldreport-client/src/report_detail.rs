//! Single-report view: loads the report, then the safety instructions for it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fieldreport_shared::types::{Report, ReportId};
use fieldreport_shared::ReportError;

use crate::backend::{ReportStore, Services};
use crate::instructions::{fetch_instructions, Completer};
use crate::view::ViewState;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailSnapshot {
    pub loading_report: bool,
    pub report: Option<Report>,
    pub loading_instructions: bool,
    pub instructions: Option<String>,
    pub error: Option<ReportError>,
}

pub struct ReportDetailView {
    state: Arc<ViewState<DetailSnapshot>>,
    task: Option<JoinHandle<()>>,
}

impl ReportDetailView {
    pub fn mount(services: &Services, id: ReportId) -> Self {
        let state = Arc::new(ViewState::new(DetailSnapshot {
            loading_report: true,
            ..DetailSnapshot::default()
        }));
        let task = tokio::spawn(load(
            state.clone(),
            services.reports.clone(),
            services.completer.clone(),
            id,
        ));
        Self {
            state,
            task: Some(task),
        }
    }

    pub fn snapshot(&self) -> DetailSnapshot {
        self.state.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<DetailSnapshot> {
        self.state.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.state.revision()
    }

    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.state.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReportDetailView {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn load(
    state: Arc<ViewState<DetailSnapshot>>,
    reports: Arc<dyn ReportStore>,
    completer: Arc<dyn Completer>,
    id: ReportId,
) {
    let report = match reports.fetch_report(&id).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            debug!(%id, "report not found");
            state.commit(|s| {
                s.loading_report = false;
                s.error = Some(ReportError::Fetch(format!("report {id} not found")));
            });
            return;
        }
        Err(e) => {
            warn!(%id, error = %e, "report fetch failed");
            state.commit(|s| {
                s.loading_report = false;
                s.error = Some(e);
            });
            return;
        }
    };

    let category = report.category.clone();
    let description = report.description.clone();
    let mounted = state.commit(|s| {
        s.loading_report = false;
        s.report = Some(report);
        s.loading_instructions = true;
    });
    if !mounted {
        return;
    }

    let text = fetch_instructions(&*completer, Some(&category), &description).await;
    state.commit(|s| {
        s.loading_instructions = false;
        s.instructions = Some(text);
    });
}
