//! Image service endpoints.

use tracing::info;

use crate::models::GeneratedImage;

use super::request::OutboundRequest;
use super::{ApiClient, ApiError};

/// Default page size for history.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

pub struct ImagesApi {
    client: ApiClient,
}

impl ImagesApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Generate images for a prompt, optionally tagged with a category.
    pub async fn generate(
        &self,
        prompt: &str,
        category: Option<&str>,
    ) -> Result<GeneratedImage, ApiError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ApiError::InvalidRequest("prompt is empty".to_string()));
        }

        let mut request = OutboundRequest::post("images/generate").form_field("prompt", prompt);
        if let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) {
            request = request.form_field("category", category);
        }

        let image: GeneratedImage = self.client.send_json(&request).await?;
        info!(id = %image.id, images = image.image_urls.len(), "Images generated");
        Ok(image)
    }

    /// The signed-in user's generations, newest first.
    pub async fn history(&self, skip: u32, limit: u32) -> Result<Vec<GeneratedImage>, ApiError> {
        let request = OutboundRequest::get("images/history")
            .query("skip", skip)
            .query("limit", limit);
        self.client.send_json(&request).await
    }

    /// First page of history with the default page size.
    pub async fn recent(&self) -> Result<Vec<GeneratedImage>, ApiError> {
        self.history(0, DEFAULT_HISTORY_LIMIT).await
    }

    pub async fn delete(&self, image_id: &str) -> Result<(), ApiError> {
        if image_id.trim().is_empty() {
            return Err(ApiError::InvalidRequest("image id is empty".to_string()));
        }
        self.client.delete(OutboundRequest::delete("images").segment(image_id)).await?;
        info!(id = image_id, "Image deleted");
        Ok(())
    }
}
