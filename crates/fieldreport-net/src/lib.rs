// Remote access layer: REST tables, object storage, realtime change feed and
// the completion API.

pub mod completion;
pub mod error;
pub mod realtime;
pub mod rest;
pub mod storage;

pub use completion::CompletionClient;
pub use error::NetError;
pub use realtime::{subscribe, ChangeFilter, Subscription};
pub use rest::BackendClient;
