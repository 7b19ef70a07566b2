//! Phone-number sign-in.
//!
//! There is no credential check: a phone number identifies a user profile,
//! which is created on first sign-in.

use tracing::{info, warn};

use fieldreport_shared::ReportError;
use fieldreport_store::Database;

use crate::backend::ProfileStore;
use crate::session::SessionContext;

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// Canonical form of a phone number: an optional leading `+` and 7-15 digits.
/// Spaces, dashes, dots and parentheses are stripped.
pub fn normalize_phone(raw: &str) -> Result<String, ReportError> {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let (plus, digits) = match stripped.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", stripped.as_str()),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReportError::validation("Enter a valid phone number"));
    }
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(ReportError::validation(format!(
            "Phone number must have {MIN_DIGITS} to {MAX_DIGITS} digits"
        )));
    }
    Ok(format!("{plus}{digits}"))
}

/// Sign in with a phone number, creating the profile on first use, and
/// persist the resulting session.
///
/// A failure to persist is logged; the returned session is still usable for
/// the lifetime of the process.
pub async fn sign_in(
    profiles: &dyn ProfileStore,
    store: &Database,
    phone: &str,
) -> Result<SessionContext, ReportError> {
    let phone = normalize_phone(phone)?;
    let profile = profiles.find_or_create_profile(&phone).await?;

    let session = SessionContext::new(Some(phone), Some(profile.id));
    if let Err(e) = session.save(store) {
        warn!(error = %e, "failed to persist session");
    }
    info!(user = %session.user_id().map(|u| u.short()).unwrap_or_default(), "signed in");
    Ok(session)
}

pub fn sign_out(session: &mut SessionContext, store: &Database) {
    if let Err(e) = session.clear(store) {
        warn!(error = %e, "failed to clear stored session");
    }
    info!("signed out");
}
