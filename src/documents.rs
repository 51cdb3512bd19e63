// src/documents.rs
use crate::errors::{GradingError, Result};
use reqwest::Client;

/// Downloads a document and returns its text body.
///
/// Documents are expected to already be plain text by the time they are
/// referenced here; binary formats go through the upload pipeline's
/// extraction step first.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    log::debug!("📄 Fetching document {}", url);

    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "Could not read error body".to_string());
        return Err(GradingError::ApiError {
            status: status.as_u16(),
            body,
        });
    }

    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Err(GradingError::EmptyResponse);
    }
    Ok(text)
}

/// Last path segment of a document URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> String {
    let without_suffix = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    without_suffix
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string()
}
