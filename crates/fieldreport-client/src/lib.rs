//! # fieldreport-client
//!
//! Client-side flows of the field reporting app: sign-in, the live report
//! list, the report detail view with generated safety instructions, and report
//! submission. UI shells drive these through [`state::AppState`].

pub mod auth;
pub mod backend;
pub mod config;
pub mod device;
pub mod events;
pub mod instructions;
pub mod reconcile;
pub mod report_detail;
pub mod report_list;
pub mod session;
pub mod state;
pub mod submit;

mod view;

#[cfg(test)]
pub(crate) mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::Services;
pub use config::ClientConfig;
pub use events::UserAlert;
pub use report_detail::{DetailSnapshot, ReportDetailView};
pub use report_list::{ListMode, ListSnapshot, ListStatus, RefreshOutcome, ReportListView};
pub use session::SessionContext;
pub use state::AppState;
pub use submit::{ReportDraft, ReportForm, SubmissionPolicy};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("fieldreport_client=debug,fieldreport_net=debug,fieldreport_store=info,warn")
    });

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting fieldreport client");
    }
}
