//! Domain types shared by every fieldreport crate: the report schema, change
//! notifications, the error taxonomy and protocol constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod timestamp;
pub mod types;

pub use error::ReportError;
pub use protocol::{ChangeEvent, ChangeKind};
pub use types::{NewReport, Report, ReportId, Scope, UserId, UserProfile};
