//! Wire types exchanged with the personalization service.

use crate::media::ImageFile;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Multipart field carrying the primary photo.
pub const PHOTO_FIELD: &str = "photo";
/// Multipart field carrying the optional style template.
pub const TEMPLATE_FIELD: &str = "template";
/// Multipart field carrying the optional style prompt.
pub const PROMPT_FIELD: &str = "prompt";

/// Content type assumed for a fetched result that declares none.
pub const DEFAULT_RESULT_MEDIA_TYPE: &str = "image/png";

/// Everything sent to `POST /upload`.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadRequest {
    pub photo: ImageFile,
    pub template: Option<ImageFile>,
    /// Already trimmed; absent when the user's text was blank.
    pub prompt: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UploadResponse {
    pub task_id: String,
}

/// Body of `GET /status/{task_id}`.
///
/// Every field is optional on the wire. A missing or non-string `status`
/// reads as an unrecognized value and therefore as "still in progress".
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: String,
    #[serde(default)]
    pub result_url: Option<String>,
    /// Legacy alias of `result_url`.
    #[serde(default)]
    pub stylized_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Service's explanation of how the result was produced.
    #[serde(default)]
    pub note: Option<String>,
}

impl StatusResponse {
    pub fn job_status(&self) -> JobStatus {
        JobStatus::parse(&self.status)
    }

    /// The result reference, preferring the canonical field.
    pub fn result_reference(&self) -> Option<&str> {
        non_blank(self.result_url.as_deref()).or_else(|| non_blank(self.stylized_url.as_deref()))
    }

    pub fn error_message(&self) -> Option<&str> {
        non_blank(self.error.as_deref())
    }
}

fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(status)) => Ok(status),
        _ => Ok(String::new()),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parsed `status` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Done,
    Error,
    /// Anything else, including `queued`, `processing` and unknown values.
    Pending(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "done" => Self::Done,
            "error" => Self::Error,
            other => Self::Pending(other.to_string()),
        }
    }
}

/// Non-success body the service may send along with an error status.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServiceErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ServiceErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        let detail = self
            .detail
            .and_then(|d| d.as_str().map(str::to_string));
        self.error.or(detail).filter(|m| !m.trim().is_empty())
    }
}

/// Binary content of a fetched result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> StatusResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_canonical_reference_wins() {
        let resp = parse(r#"{"status":"done","result_url":"/a.png","stylized_url":"/b.png"}"#);
        assert_eq!(resp.job_status(), JobStatus::Done);
        assert_eq!(resp.result_reference(), Some("/a.png"));
    }

    #[test]
    fn test_legacy_reference() {
        let resp = parse(r#"{"status":"done","stylized_url":"http://cdn/x.png","note":"no_template"}"#);
        assert_eq!(resp.result_reference(), Some("http://cdn/x.png"));
        assert_eq!(resp.note.as_deref(), Some("no_template"));

        // An empty canonical field does not shadow the alias
        let resp = parse(r#"{"status":"done","result_url":"","stylized_url":"/b.png"}"#);
        assert_eq!(resp.result_reference(), Some("/b.png"));
    }

    #[test]
    fn test_statuses() {
        assert_eq!(parse(r#"{"status":"error","error":"bad face"}"#).error_message(), Some("bad face"));
        assert_eq!(parse(r#"{"status":"queued"}"#).job_status(), JobStatus::Pending("queued".into()));

        let missing = parse(r#"{"unexpected":true}"#);
        assert_eq!(missing.job_status(), JobStatus::Pending(String::new()));
    }

    #[test]
    fn test_non_string_status_is_pending() {
        for raw in [r#"{"status":null}"#, r#"{"status":3}"#, r#"{"status":{"phase":"x"}}"#, r#"{"status":["done"]}"#] {
            let resp: StatusResponse = serde_json::from_str(raw).unwrap();
            assert_eq!(resp.job_status(), JobStatus::Pending(String::new()), "{raw}");
        }

        // Other fields still come through
        let resp = parse(r#"{"status":7,"result_url":"/a.png"}"#);
        assert_eq!(resp.result_url.as_deref(), Some("/a.png"));
    }

    #[test]
    fn test_error_body_message() {
        let body: ServiceErrorBody =
            serde_json::from_str(r#"{"error":"Please provide either a template image or a custom prompt."}"#).unwrap();
        assert_eq!(
            body.into_message().as_deref(),
            Some("Please provide either a template image or a custom prompt.")
        );

        let body: ServiceErrorBody = serde_json::from_str(r#"{"detail":"Not Found"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Not Found"));

        // FastAPI validation details are structured, not a message
        let body: ServiceErrorBody = serde_json::from_str(r#"{"detail":[{"loc":["body","photo"]}]}"#).unwrap();
        assert_eq!(body.into_message(), None);
    }
}
