//! Latest-publish lookup and the [`BundleInfo`] descriptor.
//!
//! The publish endpoint answers with
//! `{"data": {"id", "publish_date", "download_url", "languages"}}`. Parsing is
//! best effort inside `data`: every field is optional and a malformed value
//! reads as absent. Only a missing `data` object is an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::contract::Transport;
use crate::error::{MetadataError, TransportError};

/// Fixed publish date format used by the server, e.g. `2017-08-25T10:20:30.000+0000`.
pub const PUBLISH_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Information about the latest bundle published for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    /// Bundle identifier as provided by the server.
    pub identifier: Option<String>,
    /// When the bundle was published.
    pub publish_date: Option<DateTime<Utc>>,
    /// Where to download the archive. May redirect.
    pub download_url: Option<Url>,
    /// Language codes the bundle is available in.
    pub available_languages: Option<Vec<String>>,
}

impl BundleInfo {
    /// Build from a full publish response. Returns `None` when the response
    /// has no `data` object.
    pub fn from_response(response: &Value) -> Option<Self> {
        let data = response.get("data")?.as_object()?;

        let identifier = data.get("id").and_then(Value::as_str).map(str::to_owned);

        let publish_date = data
            .get("publish_date")
            .and_then(Value::as_str)
            .and_then(parse_publish_date);

        let download_url = data
            .get("download_url")
            .and_then(Value::as_str)
            .and_then(|raw| Url::parse(raw).ok());

        let available_languages = data.get("languages").and_then(Value::as_array).and_then(|langs| {
            langs
                .iter()
                .map(|l| l.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
        });

        Some(BundleInfo {
            identifier,
            publish_date,
            download_url,
            available_languages,
        })
    }

    /// Publish date as fractional seconds since the Unix epoch.
    pub fn publish_timestamp(&self) -> Option<f64> {
        self.publish_date
            .map(|date| date.timestamp_millis() as f64 / 1000.0)
    }
}

/// Parse a publish date in the server's fixed format, also accepting RFC 3339
/// (`...000Z`).
pub fn parse_publish_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, PUBLISH_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| debug!(raw, error = %e, "Unparsable publish_date"))
        .ok()
}

/// Request path of the latest-publish endpoint.
pub fn latest_publish_path(project_id: &str) -> String {
    format!("projects/{project_id}/publishes/latest")
}

/// Client for the remote "latest publish" endpoint.
pub struct BundleMetadataClient<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> BundleMetadataClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Fetch information about the latest publish for `project_id`.
    ///
    /// Without `language` the server's default language is used.
    pub async fn get_latest_bundle_info(
        &self,
        project_id: &str,
        language: Option<&str>,
    ) -> Result<BundleInfo, MetadataError> {
        let path = latest_publish_path(project_id);
        let query = language
            .map(|lang| vec![("language".to_string(), lang.to_string())])
            .unwrap_or_default();

        info!(path = %path, language = language.unwrap_or("<default>"), "Requesting latest bundle information");

        let response = match self.transport.get_json(&path, query).await {
            Ok(response) => response,
            // The request went through; only the body is unusable.
            Err(TransportError::Json(e)) => {
                error!(error = %e, path = %path, "Bundle information response is not JSON");
                return Err(MetadataError::InvalidDataReturned);
            }
            Err(e) => {
                error!(error = %e, path = %path, "Latest bundle request failed");
                return Err(MetadataError::Transport(e));
            }
        };

        match BundleInfo::from_response(&response) {
            Some(bundle_info) => {
                debug!(?bundle_info, "Parsed bundle information");
                Ok(bundle_info)
            }
            None => {
                error!(path = %path, "Bundle information response has no data object");
                Err(MetadataError::InvalidDataReturned)
            }
        }
    }
}
