use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ChapterId, CourseId, ReorderScope},
    error::{ApiError, ApiException},
    protocol::{
        ChapterSummary, ContentItemSummary, CourseSummary, ModuleSummary, ReorderRequest,
        ReorderResponse,
    },
};

/// Persistence seam used by the reorder controllers.
///
/// `reorder` always receives the complete id order of the scope and must be
/// idempotent for identical input.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_modules(&self, course_id: CourseId) -> Result<Vec<ModuleSummary>>;
    async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<ChapterSummary>>;
    async fn list_content(&self, chapter_id: ChapterId) -> Result<Vec<ContentItemSummary>>;
    async fn reorder(&self, scope: ReorderScope, ordered_item_ids: &[i64]) -> Result<()>;
}

/// `ItemStore` backed by the course outline REST API.
#[derive(Clone)]
pub struct HttpItemStore {
    http: Client,
    server_url: String,
}

impl HttpItemStore {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self { http, server_url }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        self.get_json("/courses").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.server_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let body = error_for_api_status(response)
            .await?
            .json()
            .await
            .with_context(|| format!("GET {url} returned an unexpected body"))?;
        Ok(body)
    }
}

#[async_trait]
impl ItemStore for HttpItemStore {
    async fn list_modules(&self, course_id: CourseId) -> Result<Vec<ModuleSummary>> {
        self.get_json(&format!("/courses/{}/modules", course_id.0))
            .await
    }

    async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<ChapterSummary>> {
        self.get_json(&format!("/courses/{}/chapters", course_id.0))
            .await
    }

    async fn list_content(&self, chapter_id: ChapterId) -> Result<Vec<ContentItemSummary>> {
        self.get_json(&format!("/chapters/{}/content", chapter_id.0))
            .await
    }

    async fn reorder(&self, scope: ReorderScope, ordered_item_ids: &[i64]) -> Result<()> {
        let url = format!("{}{}", self.server_url, scope.order_route());
        let request = ReorderRequest {
            scope_id: scope.parent_id(),
            ordered_item_ids: ordered_item_ids.to_vec(),
        };
        let response = self
            .http
            .put(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("PUT {url} failed"))?;
        let accepted: ReorderResponse = error_for_api_status(response)
            .await?
            .json()
            .await
            .with_context(|| format!("PUT {url} returned an unexpected body"))?;
        if accepted.ordered_item_ids != ordered_item_ids {
            return Err(anyhow!(
                "server acknowledged a different order for {scope}: {:?}",
                accepted.ordered_item_ids
            ));
        }
        Ok(())
    }
}

/// Turns a non-2xx response into an error, preserving a structured
/// `ApiError` body as `ApiException` when the server sent one.
async fn error_for_api_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(ApiException::from(api_error))
            .with_context(|| format!("server rejected request with status {status}")),
        Err(_) => Err(anyhow!("server returned {status}: {body}")),
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
