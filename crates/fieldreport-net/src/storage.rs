//! Object storage uploads.
//!
//! Objects are written with `POST /storage/v1/object/<bucket>/<name>` and read
//! back through the bucket's public URL.

use tracing::{debug, info};

use crate::error::{NetError, Result};
use crate::rest::{send, BackendClient};

/// Characters allowed in generated object names besides ASCII alphanumerics.
const NAME_PUNCTUATION: &[char] = &['-', '_', '.', '/'];

impl BackendClient {
    pub fn public_object_url(&self, bucket: &str, name: &str) -> String {
        self.endpoint(&format!("storage/v1/object/public/{bucket}/{name}"))
    }

    /// Upload `data` as `<bucket>/<name>` and return its public URL.
    pub async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        validate_object_name(name)?;
        if data.is_empty() {
            return Err(NetError::Config("refusing to upload an empty object".into()));
        }

        let size = data.len();
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{name}"));
        debug!(bucket, name, size, "uploading object");

        let req = self
            .http()
            .post(url)
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(data);
        send(self.authed(req)).await?;

        info!(bucket, name, size, "object uploaded");
        Ok(self.public_object_url(bucket, name))
    }
}

fn validate_object_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('/')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || NAME_PUNCTUATION.contains(&c));
    if valid {
        Ok(())
    } else {
        Err(NetError::Config(format!("invalid object name: {name:?}")))
    }
}
