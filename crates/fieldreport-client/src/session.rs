use tracing::debug;

use fieldreport_shared::types::UserId;
use fieldreport_shared::ReportError;
use fieldreport_store::session::StoredSession;
use fieldreport_store::{Database, StoreError};

use crate::backend::ProfileStore;

/// Who is signed in on this device.
///
/// Passed explicitly to every flow that needs the current user instead of
/// being read from process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    phone: Option<String>,
    user_id: Option<UserId>,
}

impl SessionContext {
    pub fn new(phone: Option<String>, user_id: Option<UserId>) -> Self {
        Self {
            phone: phone.filter(|p| !p.trim().is_empty()),
            user_id: user_id.filter(|u| !u.as_str().trim().is_empty()),
        }
    }

    pub fn load(store: &Database) -> Result<Self, StoreError> {
        let stored = store.load_session()?;
        let session = Self::new(stored.phone, stored.user_id.map(UserId::new));
        debug!(signed_in = session.is_signed_in(), "session loaded");
        Ok(session)
    }

    pub fn save(&self, store: &Database) -> Result<(), StoreError> {
        store.save_session(&StoredSession {
            phone: self.phone.clone(),
            user_id: self.user_id.as_ref().map(|u| u.as_str().to_string()),
        })
    }

    pub fn clear(&mut self, store: &Database) -> Result<(), StoreError> {
        store.clear_session()?;
        self.phone = None;
        self.user_id = None;
        Ok(())
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some() || self.phone.is_some()
    }
}

/// Resolve the remote user id for `session`, looking the profile up by phone
/// when only the phone number is known.
pub async fn resolve_user(
    session: &SessionContext,
    profiles: &dyn ProfileStore,
) -> Result<UserId, ReportError> {
    if let Some(uid) = session.user_id() {
        return Ok(uid.clone());
    }
    let phone = session.phone().ok_or(ReportError::NotAuthenticated)?;
    match profiles.find_profile(phone).await? {
        Some(profile) => {
            debug!(user = %profile.id.short(), "user resolved by phone");
            Ok(profile.id)
        }
        None => Err(ReportError::NotAuthenticated),
    }
}
