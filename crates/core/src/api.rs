//! Client for the remote personalization service.
//!
//! [`PersonalizeApi`] is the seam the session talks through; [`HttpClient`]
//! is its reqwest implementation against the service's HTTP API:
//!
//! - `POST /upload` (multipart: `photo`, optional `template`, optional `prompt`)
//! - `GET /status/{task_id}`
//! - plain `GET` of a resolved result address

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    DEFAULT_RESULT_MEDIA_TYPE, FetchedImage, PHOTO_FIELD, PROMPT_FIELD, ServiceErrorBody,
    StatusResponse, TEMPLATE_FIELD, UploadRequest, UploadResponse,
};
use crate::media::ImageFile;
use crate::result::resolve_result_url;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, header};
use url::Url;

/// Operations the session needs from the personalization service.
#[async_trait]
pub trait PersonalizeApi: Send + Sync {
    /// Submits the inputs and returns the identifier of the new job.
    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse>;

    /// Queries the current status of a job.
    async fn status(&self, task_id: &str) -> Result<StatusResponse>;

    /// Fetches a result address as binary content.
    async fn fetch(&self, url: &Url) -> Result<FetchedImage>;
}

/// reqwest-backed [`PersonalizeApi`].
#[derive(Clone, Debug)]
pub struct HttpClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: config.service_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        resolve_result_url(&self.base, path)
    }

    fn file_part(file: ImageFile) -> Result<Part> {
        let ImageFile {
            name,
            media_type,
            bytes,
        } = file;
        let part = Part::bytes(bytes).file_name(name);
        Ok(part.mime_str(&media_type)?)
    }

    fn build_form(request: UploadRequest) -> Result<Form> {
        let mut form = Form::new().part(PHOTO_FIELD, Self::file_part(request.photo)?);
        if let Some(template) = request.template {
            form = form.part(TEMPLATE_FIELD, Self::file_part(template)?);
        }
        if let Some(prompt) = request.prompt {
            form = form.text(PROMPT_FIELD, prompt);
        }
        Ok(form)
    }
}

/// Turns a non-success response into [`AppError::Service`], keeping the
/// service's own message when the body carries one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ServiceErrorBody>(&body)
        .ok()
        .and_then(ServiceErrorBody::into_message);

    Err(AppError::Service {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PersonalizeApi for HttpClient {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse> {
        let url = self.endpoint("/upload")?;
        let form = Self::build_form(request)?;

        log::debug!("POST {}", url);
        let response = self.http.post(url).multipart(form).send().await?;
        let body = check_status(response).await?.text().await?;

        let upload: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::malformed(format!("upload response: {}", e)))?;
        if upload.task_id.trim().is_empty() {
            return Err(AppError::malformed("upload response has an empty task_id"));
        }
        Ok(upload)
    }

    async fn status(&self, task_id: &str) -> Result<StatusResponse> {
        let mut url = self.endpoint("/status")?;
        url.path_segments_mut()
            .map_err(|_| AppError::config("Service URL cannot carry a path"))?
            .push(task_id);

        log::debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let body = check_status(response).await?.text().await?;

        serde_json::from_str(&body)
            .map_err(|e| AppError::malformed(format!("status response: {}", e)))
    }

    async fn fetch(&self, url: &Url) -> Result<FetchedImage> {
        log::debug!("GET {}", url);
        let response = check_status(self.http.get(url.clone()).send().await?).await?;

        let media_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_RESULT_MEDIA_TYPE)
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedImage { bytes, media_type })
    }
}
