//! Device capabilities the form depends on. Platform shells implement these.

use async_trait::async_trait;

use fieldreport_shared::ReportError;

use crate::submit::ImageAttachment;

/// Reverse-geocoded address of the device's current position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub street: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Join the non-empty address parts with `, `, skipping a part that repeats
/// the previous one (geocoders often return the street as the name).
pub fn format_address(address: &Address) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in [
        &address.name,
        &address.street,
        &address.district,
        &address.city,
        &address.region,
        &address.postal_code,
        &address.country,
    ] {
        let Some(part) = part.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            continue;
        };
        if parts.last() != Some(&part) {
            parts.push(part);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Fails with [`ReportError::PermissionDenied`] when location access is refused.
    async fn current_address(&self) -> Result<Address, ReportError>;
}

#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// `Ok(None)` when the user cancels the capture.
    async fn capture(&self) -> Result<Option<ImageAttachment>, ReportError>;
}
