//! Report submission.
//!
//! [`submit_report`] validates the draft locally, uploads the optional image
//! and inserts the row, in that order, stopping at the first failure.
//! [`ReportForm`] wraps it with form state: kept on failure, reset on success.

use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldreport_shared::constants::{DEFAULT_CATEGORY, MAX_IMAGE_SIZE};
use fieldreport_shared::types::{NewReport, Report, UserId};
use fieldreport_shared::ReportError;

use crate::backend::{ObjectStore, ReportStore, Services};
use crate::device::{format_address, CameraProvider, LocationProvider};
use crate::session::{resolve_user, SessionContext};

/// Which optional fields a submission must or may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    pub require_gps: bool,
    pub allow_image: bool,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            require_gps: false,
            allow_image: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl ImageAttachment {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }

    /// File extension for the stored object.
    pub fn extension(&self) -> &'static str {
        match self.content_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/heic" => "heic",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDraft {
    pub category: String,
    pub description: String,
    pub location: Option<String>,
    pub gps_location: Option<String>,
    pub image: Option<ImageAttachment>,
}

impl Default for ReportDraft {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            description: String::new(),
            location: None,
            gps_location: None,
            image: None,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ReportDraft {
    /// Local checks, run before any remote call.
    pub fn validate(&self, policy: &SubmissionPolicy) -> Result<(), ReportError> {
        if self.description.trim().is_empty() {
            return Err(ReportError::validation("Please enter a description"));
        }
        if policy.require_gps && non_blank(&self.gps_location).is_none() {
            return Err(ReportError::validation("Please add your GPS location"));
        }
        if let Some(image) = &self.image {
            if !policy.allow_image {
                return Err(ReportError::validation("Image attachments are disabled"));
            }
            if image.data.is_empty() {
                return Err(ReportError::validation("The selected image is empty"));
            }
            if image.data.len() > MAX_IMAGE_SIZE {
                return Err(ReportError::validation(format!(
                    "Image exceeds {} MB",
                    MAX_IMAGE_SIZE / (1024 * 1024)
                )));
            }
        }
        Ok(())
    }

    fn to_new_report(&self, user: &UserId, image_url: Option<String>) -> NewReport {
        let category = self.category.trim();
        NewReport {
            user_id: Some(user.clone()),
            category: if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category.to_string()
            },
            description: self.description.trim().to_string(),
            location: non_blank(&self.location),
            gps_location: non_blank(&self.gps_location),
            image: image_url,
            responded: false,
        }
    }
}

/// Object name for an uploaded image: `<user>/<uuid>.<ext>`.
pub fn image_object_name(user: &UserId, image: &ImageAttachment) -> String {
    let owner: String = user
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{owner}/{}.{}", Uuid::new_v4(), image.extension())
}

/// Validate, upload the image if any, and insert the report.
pub async fn submit_report(
    reports: &dyn ReportStore,
    objects: &dyn ObjectStore,
    user: &UserId,
    draft: &ReportDraft,
    policy: &SubmissionPolicy,
) -> Result<Report, ReportError> {
    draft.validate(policy)?;

    let image_url = match &draft.image {
        Some(image) => {
            let name = image_object_name(user, image);
            debug!(%name, bytes = image.data.len(), "uploading report image");
            Some(
                objects
                    .upload(&name, image.data.clone(), &image.content_type)
                    .await?,
            )
        }
        None => None,
    };

    let report = reports
        .insert_report(&draft.to_new_report(user, image_url))
        .await?;
    info!(id = %report.id, category = %report.category, "report submitted");
    Ok(report)
}

/// Editable state of the new-report form.
#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    draft: ReportDraft,
    policy: SubmissionPolicy,
    submitting: bool,
}

impl ReportForm {
    pub fn new(policy: SubmissionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn draft(&self) -> &ReportDraft {
        &self.draft
    }

    pub fn policy(&self) -> SubmissionPolicy {
        self.policy
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.draft.category = category.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.description = description.into();
    }

    pub fn set_location(&mut self, location: Option<String>) {
        self.draft.location = location;
    }

    pub fn set_gps_location(&mut self, gps_location: Option<String>) {
        self.draft.gps_location = gps_location;
    }

    pub fn attach_image(&mut self, image: ImageAttachment) -> Result<(), ReportError> {
        if !self.policy.allow_image {
            return Err(ReportError::validation("Image attachments are disabled"));
        }
        self.draft.image = Some(image);
        Ok(())
    }

    pub fn remove_image(&mut self) {
        self.draft.image = None;
    }

    /// Fill the GPS field from the device's current address.
    pub async fn capture_location(
        &mut self,
        provider: &dyn LocationProvider,
    ) -> Result<(), ReportError> {
        let address = provider.current_address().await.map_err(|e| {
            warn!(error = %e, "location unavailable");
            e
        })?;
        match format_address(&address) {
            Some(text) => {
                self.draft.gps_location = Some(text);
                Ok(())
            }
            None => Err(ReportError::validation("Could not determine your address")),
        }
    }

    /// Take a photo and attach it. A cancelled capture leaves the form as is.
    pub async fn capture_image(&mut self, camera: &dyn CameraProvider) -> Result<(), ReportError> {
        if !self.policy.allow_image {
            return Err(ReportError::validation("Image attachments are disabled"));
        }
        if let Some(image) = camera.capture().await? {
            self.draft.image = Some(image);
        }
        Ok(())
    }

    /// Submit the draft as the session's user. On success the form is reset.
    pub async fn submit(
        &mut self,
        services: &Services,
        session: &SessionContext,
    ) -> Result<Report, ReportError> {
        self.draft.validate(&self.policy)?;

        self.submitting = true;
        let result = async {
            let user = resolve_user(session, &*services.profiles).await?;
            submit_report(
                &*services.reports,
                &*services.objects,
                &user,
                &self.draft,
                &self.policy,
            )
            .await
        }
        .await;
        self.submitting = false;

        match result {
            Ok(report) => {
                self.draft = ReportDraft::default();
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "report submission failed");
                Err(e)
            }
        }
    }
}
