//! Session state types and pure transitions.
//!
//! [`SessionState`] is the single record the session owns: the selected
//! inputs, the current [`Phase`], the live [`Job`] and the user-visible
//! error message. Every method here is synchronous and side-effect free
//! apart from the record itself (and the release of superseded previews),
//! so the whole state machine can be exercised without a network.
//!
//! The phases follow:
//! `Idle` -> `Uploading` -> `Processing` -> `Done` <-> `Downloading`
//!
//! with any in-flight phase able to fall into `Error`, and `reset` returning
//! to `Idle` from anywhere.
//!
//! # Stale completions
//!
//! Each submission and each reset bumps a generation counter. Asynchronous
//! work is issued under the generation current at the time, and its
//! completion is applied only if that generation (and, for polls, the task
//! id) still names the live job. Anything else is reported as stale and
//! leaves the record untouched.

use crate::blob::{BlobHandle, BlobStore};
use crate::error::{AppError, Result};
use crate::media::ImageFile;
use crate::models::{JobStatus, StatusResponse, UploadRequest};
use crate::result::resolve_result_url;
use url::Url;

pub const UPLOAD_FAILED: &str = "Upload failed";
pub const STATUS_CHECK_FAILED: &str = "Status check failed";
pub const PROCESSING_FAILED: &str = "Processing failed";
pub const DOWNLOAD_FAILED: &str = "Download failed";

/// What the client is currently doing or showing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Uploading,
    Processing,
    Done,
    Error,
    Downloading,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
            Self::Downloading => "downloading",
        }
    }

    /// An operation is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Uploading | Self::Processing | Self::Downloading)
    }

    /// The presentation layer may offer the submit action.
    pub fn accepts_submit(&self) -> bool {
        matches!(self, Self::Idle | Self::Done | Self::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selected image together with its local preview.
#[derive(Debug)]
pub struct SelectedImage {
    file: ImageFile,
    preview: BlobHandle,
}

impl SelectedImage {
    fn new(file: ImageFile, store: &BlobStore) -> Self {
        let preview = store.create(file.media_type.clone(), file.bytes.clone());
        Self { file, preview }
    }

    pub fn file(&self) -> &ImageFile {
        &self.file
    }

    pub fn preview_url(&self) -> String {
        self.preview.url()
    }
}

/// The user's inputs for the next submission.
#[derive(Debug, Default)]
pub struct InputSet {
    primary: Option<SelectedImage>,
    template: Option<SelectedImage>,
    prompt: String,
}

impl InputSet {
    pub fn primary(&self) -> Option<&SelectedImage> {
        self.primary.as_ref()
    }

    pub fn template(&self) -> Option<&SelectedImage> {
        self.template.as_ref()
    }

    /// The prompt exactly as entered.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The prompt if it is non-empty after trimming.
    pub fn trimmed_prompt(&self) -> Option<&str> {
        Some(self.prompt.trim()).filter(|p| !p.is_empty())
    }

    pub fn has_style(&self) -> bool {
        self.template.is_some() || self.trimmed_prompt().is_some()
    }

    pub fn can_submit(&self) -> bool {
        self.primary.is_some() && self.has_style()
    }

    /// Builds the upload for the current inputs, or the validation error
    /// that prevents it.
    pub fn upload_request(&self) -> Result<UploadRequest> {
        let primary = self.primary.as_ref().ok_or(AppError::NoPhoto)?;
        if !self.has_style() {
            return Err(AppError::MissingStyle);
        }

        Ok(UploadRequest {
            photo: primary.file.clone(),
            template: self.template.as_ref().map(|t| t.file.clone()),
            prompt: self.trimmed_prompt().map(str::to_string),
        })
    }
}

/// A server-tracked unit of personalization work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    /// Absolute address of the produced image.
    pub result_url: Option<Url>,
    pub error: Option<String>,
    pub note: Option<String>,
}

impl Job {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result_url: None,
            error: None,
            note: None,
        }
    }
}

/// What a single status response did to the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Job still in progress; poll again after the fixed delay.
    Pending,
    Done,
    Failed,
    /// Response belongs to a job that is no longer live; ignored.
    Stale,
}

/// Cloneable view of the state for the presentation layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub job: Option<Job>,
    pub error: Option<String>,
    pub can_submit: bool,
    pub primary_name: Option<String>,
    pub primary_preview: Option<String>,
    pub template_preview: Option<String>,
    pub prompt: String,
}

impl Snapshot {
    pub fn result_url(&self) -> Option<&Url> {
        self.job.as_ref().and_then(|job| job.result_url.as_ref())
    }
}

/// The exclusively-owned state record of one session.
#[derive(Debug)]
pub struct SessionState {
    base: Url,
    inputs: InputSet,
    phase: Phase,
    job: Option<Job>,
    error: Option<String>,
    generation: u64,
}

impl SessionState {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            inputs: InputSet::default(),
            phase: Phase::Idle,
            job: None,
            error: None,
            generation: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn inputs(&self) -> &InputSet {
        &self.inputs
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result_url(&self) -> Option<&Url> {
        self.job.as_ref().and_then(|job| job.result_url.as_ref())
    }

    pub fn can_submit(&self) -> bool {
        self.inputs.can_submit()
    }

    fn reject<T>(&mut self, err: AppError) -> Result<T> {
        self.error = Some(err.to_string());
        Err(err)
    }

    /// Replaces the primary photo. A new photo invalidates the previous
    /// template and prompt.
    pub fn select_primary(&mut self, file: ImageFile, store: &BlobStore) -> Result<()> {
        if !file.is_image() {
            return self.reject(AppError::InvalidImageType(file.media_type));
        }

        self.inputs.primary = Some(SelectedImage::new(file, store));
        self.inputs.template = None;
        self.inputs.prompt.clear();
        self.error = None;
        Ok(())
    }

    pub fn select_template(&mut self, file: ImageFile, store: &BlobStore) {
        self.inputs.template = Some(SelectedImage::new(file, store));
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.inputs.prompt = text.into();
    }

    /// Validates the inputs and enters `Uploading`.
    ///
    /// Returns the generation the upload is issued under and the request to
    /// send. On a validation error nothing but the error message changes.
    pub fn begin_upload(&mut self) -> Result<(u64, UploadRequest)> {
        let request = match self.inputs.upload_request() {
            Ok(request) => request,
            Err(err) => return self.reject(err),
        };

        self.generation += 1;
        self.phase = Phase::Uploading;
        self.job = None;
        self.error = None;
        Ok((self.generation, request))
    }

    /// Records the job the service created. Returns `false` if the upload
    /// was superseded in the meantime.
    pub fn upload_succeeded(&mut self, generation: u64, task_id: &str) -> bool {
        if generation != self.generation || self.phase != Phase::Uploading {
            return false;
        }
        self.job = Some(Job::new(task_id));
        self.phase = Phase::Processing;
        true
    }

    pub fn upload_failed(&mut self, generation: u64, message: impl Into<String>) -> bool {
        if generation != self.generation || self.phase != Phase::Uploading {
            return false;
        }
        self.phase = Phase::Error;
        self.error = Some(message.into());
        true
    }

    /// Whether a poll issued under `generation` for `task_id` is still wanted.
    pub fn is_polling(&self, generation: u64, task_id: &str) -> bool {
        generation == self.generation
            && self.phase == Phase::Processing
            && self.job.as_ref().is_some_and(|job| job.id == task_id)
    }

    /// Applies one status response for the live job.
    pub fn apply_status(
        &mut self,
        generation: u64,
        task_id: &str,
        response: &StatusResponse,
    ) -> PollOutcome {
        if !self.is_polling(generation, task_id) {
            return PollOutcome::Stale;
        }

        match response.job_status() {
            JobStatus::Done => {
                let result_url = response.result_reference().and_then(|reference| {
                    resolve_result_url(&self.base, reference)
                        .inspect_err(|e| log::warn!("Unusable result reference '{}': {}", reference, e))
                        .ok()
                });
                if let Some(job) = self.job.as_mut() {
                    job.result_url = result_url;
                    job.note = response.note.clone();
                }
                self.phase = Phase::Done;
                PollOutcome::Done
            }
            JobStatus::Error => {
                let message = response
                    .error_message()
                    .unwrap_or(PROCESSING_FAILED)
                    .to_string();
                self.fail_job(message);
                PollOutcome::Failed
            }
            JobStatus::Pending(_) => PollOutcome::Pending,
        }
    }

    /// Records a transport or service failure of a poll attempt.
    pub fn poll_failed(
        &mut self,
        generation: u64,
        task_id: &str,
        message: impl Into<String>,
    ) -> PollOutcome {
        if !self.is_polling(generation, task_id) {
            return PollOutcome::Stale;
        }
        self.fail_job(message.into());
        PollOutcome::Failed
    }

    fn fail_job(&mut self, message: String) {
        if let Some(job) = self.job.as_mut() {
            job.error = Some(message.clone());
        }
        self.error = Some(message);
        self.phase = Phase::Error;
    }

    /// Enters `Downloading` if there is a result to fetch.
    pub fn begin_download(&mut self) -> Option<(u64, Url)> {
        let url = self.result_url()?.clone();
        self.phase = Phase::Downloading;
        Some((self.generation, url))
    }

    pub fn download_finished(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.phase != Phase::Downloading {
            return false;
        }
        self.phase = Phase::Done;
        true
    }

    pub fn download_failed(&mut self, generation: u64, message: impl Into<String>) -> bool {
        if generation != self.generation || self.phase != Phase::Downloading {
            return false;
        }
        self.phase = Phase::Error;
        self.error = Some(message.into());
        true
    }

    /// Discards inputs, job and error, releasing every preview.
    pub fn reset(&mut self) {
        self.inputs = InputSet::default();
        self.job = None;
        self.error = None;
        self.phase = Phase::Idle;
        self.generation += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            job: self.job.clone(),
            error: self.error.clone(),
            can_submit: self.can_submit(),
            primary_name: self.inputs.primary().map(|p| p.file.name.clone()),
            primary_preview: self.inputs.primary().map(SelectedImage::preview_url),
            template_preview: self.inputs.template().map(SelectedImage::preview_url),
            prompt: self.inputs.prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo() -> ImageFile {
        ImageFile::new("me.jpg", "image/jpeg", vec![1, 2, 3])
    }

    fn template() -> ImageFile {
        ImageFile::new("style.png", "image/png", vec![4, 5])
    }

    fn state() -> SessionState {
        SessionState::new(Url::parse("http://svc").unwrap())
    }

    fn status(json: &str) -> StatusResponse {
        serde_json::from_str(json).unwrap()
    }

    /// Drives a fresh state into `Processing` for `task_id`.
    fn processing(store: &BlobStore, task_id: &str) -> (SessionState, u64) {
        let mut s = state();
        s.select_primary(photo(), store).unwrap();
        s.set_prompt("storybook watercolor");
        let (generation, _) = s.begin_upload().unwrap();
        assert!(s.upload_succeeded(generation, task_id));
        (s, generation)
    }

    #[test]
    fn test_can_submit_truth_table() {
        let store = BlobStore::new();
        for has_photo in [false, true] {
            for has_template in [false, true] {
                for prompt in ["", "   ", " cartoon "] {
                    let mut s = state();
                    if has_photo {
                        s.select_primary(photo(), &store).unwrap();
                    }
                    if has_template {
                        s.select_template(template(), &store);
                    }
                    s.set_prompt(prompt);

                    let expected = has_photo && (has_template || !prompt.trim().is_empty());
                    assert_eq!(s.can_submit(), expected, "{has_photo} {has_template} {prompt:?}");
                }
            }
        }
    }

    #[test]
    fn test_new_photo_clears_customization() {
        let store = BlobStore::new();
        let mut s = state();
        s.select_primary(photo(), &store).unwrap();
        s.select_template(template(), &store);
        s.set_prompt("pirate");
        assert_eq!(store.live_count(), 2);

        s.select_primary(ImageFile::new("other.png", "image/png", vec![9]), &store).unwrap();
        assert!(s.inputs().template().is_none());
        assert_eq!(s.inputs().prompt(), "");
        assert_eq!(s.inputs().primary().unwrap().file().name, "other.png");
        // Previous photo and template previews were released
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_non_image_is_rejected() {
        let store = BlobStore::new();
        let mut s = state();
        s.select_primary(photo(), &store).unwrap();
        s.set_prompt("pirate");

        let err = s
            .select_primary(ImageFile::new("notes.txt", "text/plain", vec![1]), &store)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidImageType(_)));
        assert_eq!(s.error(), Some("Please drop a valid image file."));
        // Nothing else changed
        assert_eq!(s.inputs().primary().unwrap().file().name, "me.jpg");
        assert_eq!(s.inputs().prompt(), "pirate");
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_validation_order() {
        let store = BlobStore::new();
        let mut s = state();
        s.set_prompt("pirate");
        assert!(matches!(s.begin_upload(), Err(AppError::NoPhoto)));
        assert_eq!(s.phase(), Phase::Idle);

        s.select_primary(photo(), &store).unwrap();
        assert!(matches!(s.begin_upload(), Err(AppError::MissingStyle)));
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(
            s.error(),
            Some("Please provide either a template image or a custom prompt.")
        );
    }

    #[test]
    fn test_upload_request_contents() {
        let store = BlobStore::new();
        let mut s = state();
        s.select_primary(photo(), &store).unwrap();
        s.select_template(template(), &store);
        s.set_prompt("  watercolor  ");

        let (_, request) = s.begin_upload().unwrap();
        assert_eq!(request.photo.name, "me.jpg");
        assert_eq!(request.template.unwrap().name, "style.png");
        assert_eq!(request.prompt.as_deref(), Some("watercolor"));
        assert_eq!(s.phase(), Phase::Uploading);

        let mut s = state();
        s.select_primary(photo(), &store).unwrap();
        s.select_template(template(), &store);
        s.set_prompt("   ");
        let (_, request) = s.begin_upload().unwrap();
        assert!(request.prompt.is_none());
    }

    #[test]
    fn test_upload_outcomes() {
        let store = BlobStore::new();
        let (s, _) = processing(&store, "abc123");
        assert_eq!(s.phase(), Phase::Processing);
        assert_eq!(s.job().unwrap().id, "abc123");

        let mut s = state();
        s.select_primary(photo(), &store).unwrap();
        s.set_prompt("pirate");
        let (generation, _) = s.begin_upload().unwrap();
        assert!(s.upload_failed(generation, "Upload failed"));
        assert_eq!(s.phase(), Phase::Error);
        assert_eq!(s.error(), Some("Upload failed"));
    }

    #[test]
    fn test_pending_keeps_processing() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        let bodies = [
            r#"{"status":"processing"}"#,
            r#"{"status":"queued"}"#,
            r#"{"status":"weird"}"#,
            "{}",
            r#"{"status":null}"#,
            r#"{"status":3}"#,
        ];
        for raw in bodies {
            assert_eq!(s.apply_status(generation, "abc123", &status(raw)), PollOutcome::Pending);
            assert_eq!(s.phase(), Phase::Processing);
        }
    }

    #[test]
    fn test_done_resolves_relative_reference() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        let outcome = s.apply_status(
            generation,
            "abc123",
            &status(r#"{"status":"done","result_url":"/files/out.png"}"#),
        );
        assert_eq!(outcome, PollOutcome::Done);
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(s.result_url().unwrap().as_str(), "http://svc/files/out.png");
    }

    #[test]
    fn test_done_keeps_absolute_legacy_reference() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        s.apply_status(
            generation,
            "abc123",
            &status(r#"{"status":"done","stylized_url":"http://cdn/x.png","note":"no_template"}"#),
        );
        assert_eq!(s.result_url().unwrap().as_str(), "http://cdn/x.png");
        assert_eq!(s.job().unwrap().note.as_deref(), Some("no_template"));
    }

    #[test]
    fn test_done_without_reference() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        assert_eq!(
            s.apply_status(generation, "abc123", &status(r#"{"status":"done"}"#)),
            PollOutcome::Done
        );
        assert_eq!(s.phase(), Phase::Done);
        assert!(s.result_url().is_none());
        assert!(s.begin_download().is_none());
    }

    #[test]
    fn test_error_status() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        let outcome = s.apply_status(
            generation,
            "abc123",
            &status(r#"{"status":"error","error":"bad face"}"#),
        );
        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(s.phase(), Phase::Error);
        assert_eq!(s.error(), Some("bad face"));

        let (mut s, generation) = processing(&store, "abc123");
        s.apply_status(generation, "abc123", &status(r#"{"status":"error"}"#));
        assert_eq!(s.error(), Some(PROCESSING_FAILED));
    }

    #[test]
    fn test_poll_failure() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        assert_eq!(
            s.poll_failed(generation, "abc123", STATUS_CHECK_FAILED),
            PollOutcome::Failed
        );
        assert_eq!(s.phase(), Phase::Error);
        assert_eq!(s.job().unwrap().error.as_deref(), Some(STATUS_CHECK_FAILED));
    }

    #[test]
    fn test_stale_after_reset() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        s.reset();

        let done = status(r#"{"status":"done","result_url":"/x.png"}"#);
        assert_eq!(s.apply_status(generation, "abc123", &done), PollOutcome::Stale);
        assert_eq!(s.poll_failed(generation, "abc123", "boom"), PollOutcome::Stale);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.job().is_none());
        assert!(s.error().is_none());
    }

    #[test]
    fn test_stale_after_resubmission_with_same_id() {
        let store = BlobStore::new();
        let (mut s, old_generation) = processing(&store, "abc123");
        s.reset();
        s.select_primary(photo(), &store).unwrap();
        s.set_prompt("pirate");
        let (generation, _) = s.begin_upload().unwrap();
        assert!(!s.upload_succeeded(old_generation, "zzz"));
        assert!(s.upload_succeeded(generation, "abc123"));

        let done = status(r#"{"status":"done","result_url":"/x.png"}"#);
        assert_eq!(s.apply_status(old_generation, "abc123", &done), PollOutcome::Stale);
        assert_eq!(s.phase(), Phase::Processing);
        assert_eq!(s.apply_status(generation, "abc123", &done), PollOutcome::Done);
    }

    #[test]
    fn test_wrong_task_id_is_stale() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        let done = status(r#"{"status":"done"}"#);
        assert_eq!(s.apply_status(generation, "other", &done), PollOutcome::Stale);
        assert_eq!(s.phase(), Phase::Processing);
    }

    #[test]
    fn test_download_cycle() {
        let store = BlobStore::new();
        let (mut s, generation) = processing(&store, "abc123");
        s.apply_status(generation, "abc123", &status(r#"{"status":"done","result_url":"/a/b/result.png"}"#));

        let (download_gen, url) = s.begin_download().unwrap();
        assert_eq!(url.as_str(), "http://svc/a/b/result.png");
        assert_eq!(s.phase(), Phase::Downloading);
        assert!(s.download_finished(download_gen));
        assert_eq!(s.phase(), Phase::Done);

        let (download_gen, _) = s.begin_download().unwrap();
        assert!(s.download_failed(download_gen, DOWNLOAD_FAILED));
        assert_eq!(s.phase(), Phase::Error);
        assert_eq!(s.error(), Some(DOWNLOAD_FAILED));
    }

    #[test]
    fn test_reset_releases_everything() {
        let store = BlobStore::new();
        let (mut s, _) = processing(&store, "abc123");
        s.select_template(template(), &store);
        assert_eq!(store.live_count(), 2);

        s.reset();
        assert_eq!(store.live_count(), 0);
        assert_eq!(s.snapshot(), Snapshot::default());
    }

    #[test]
    fn test_phase_gating() {
        assert!(Phase::Idle.accepts_submit());
        assert!(Phase::Done.accepts_submit());
        assert!(Phase::Error.accepts_submit());
        for phase in [Phase::Uploading, Phase::Processing, Phase::Downloading] {
            assert!(phase.is_busy());
            assert!(!phase.accepts_submit());
        }
        assert_eq!(Phase::Downloading.to_string(), "downloading");
    }
}
