//! The personalization session.
//!
//! A [`Session`] drives one [`SessionState`] against a [`PersonalizeApi`]:
//! it validates and submits the inputs, runs the Polling Loop for the live
//! job on a spawned task, and retrieves the result. Every state change is
//! published as a [`Snapshot`] for the presentation layer.
//!
//! # Example
//!
//! ```ignore
//! use storyface_core::{Config, HttpClient, ImageFile, Session};
//! use std::sync::Arc;
//!
//! let config = Config::load()?;
//! let session = Session::new(Arc::new(HttpClient::new(&config)?), &config);
//!
//! session.select_primary_image(ImageFile::from_path("me.jpg")?)?;
//! session.set_prompt("watercolor storybook");
//! session.submit().await?;
//!
//! let finished = session.wait_until_settled().await;
//! println!("{:?}", finished.result_url());
//! ```

use crate::api::PersonalizeApi;
use crate::blob::BlobStore;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::media::ImageFile;
use crate::result::{ResultViewer, SaveSink, result_file_name};
use crate::state::{
    DOWNLOAD_FAILED, PollOutcome, STATUS_CHECK_FAILED, SessionState, Snapshot, UPLOAD_FAILED,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

/// State shared between the session and its polling task.
struct Shared {
    state: Mutex<SessionState>,
    updates: watch::Sender<Snapshot>,
}

impl Shared {
    /// Applies `f` to the state and publishes the resulting snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let result = f(&mut state);
            (result, state.snapshot())
        };
        self.updates.send_replace(snapshot);
        result
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }
}

/// One user's upload/poll/retrieve workflow.
pub struct Session<A: PersonalizeApi + 'static> {
    api: Arc<A>,
    shared: Arc<Shared>,
    blobs: BlobStore,
    poll_interval: Duration,
}

impl<A: PersonalizeApi + 'static> Session<A> {
    pub fn new(api: Arc<A>, config: &Config) -> Self {
        Self::with_blob_store(api, config, BlobStore::new())
    }

    /// Creates a session whose previews and downloads live in `blobs`.
    pub fn with_blob_store(api: Arc<A>, config: &Config, blobs: BlobStore) -> Self {
        let state = SessionState::new(config.service_url.clone());
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            api,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                updates,
            }),
            blobs,
            poll_interval: config.poll_interval,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.read(SessionState::snapshot)
    }

    /// Receives a fresh [`Snapshot`] after every state change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.updates.subscribe()
    }

    pub fn select_primary_image(&self, file: ImageFile) -> Result<()> {
        let result = self
            .shared
            .update(|state| state.select_primary(file, &self.blobs));
        if let Err(e) = &result {
            log::warn!("Rejected primary image: {:?}", e);
        }
        result
    }

    pub fn select_template_image(&self, file: ImageFile) {
        self.shared
            .update(|state| state.select_template(file, &self.blobs));
    }

    pub fn set_prompt(&self, text: impl Into<String>) {
        let text = text.into();
        self.shared.update(|state| state.set_prompt(text));
    }

    pub fn can_submit(&self) -> bool {
        self.shared.read(SessionState::can_submit)
    }

    /// Uploads the current inputs and starts polling the new job.
    ///
    /// Returns the job identifier. Validation errors are returned before
    /// any request is made.
    ///
    /// # Errors
    ///
    /// - [`AppError::NoPhoto`] / [`AppError::MissingStyle`] on invalid inputs
    /// - the upload's transport or service error (Phase becomes `error`)
    /// - [`AppError::Superseded`] if the session was reset while uploading
    pub async fn submit(&self) -> Result<String> {
        let (generation, request) = self.shared.update(SessionState::begin_upload)?;
        log::info!(
            "Uploading {} (template: {}, prompt: {})",
            request.photo.name,
            request.template.is_some(),
            request.prompt.is_some()
        );

        match self.api.upload(request).await {
            Ok(upload) => {
                let task_id = upload.task_id;
                if !self
                    .shared
                    .update(|state| state.upload_succeeded(generation, &task_id))
                {
                    log::debug!("Discarding upload result for superseded job {}", task_id);
                    return Err(AppError::Superseded(task_id));
                }

                log::info!("Job {} created, polling every {:?}", task_id, self.poll_interval);
                tokio::spawn(poll_until_terminal(
                    self.api.clone(),
                    self.shared.clone(),
                    generation,
                    task_id.clone(),
                    self.poll_interval,
                ));
                Ok(task_id)
            }
            Err(e) => {
                log::error!("Upload failed: {}", e);
                let message = e.user_message(UPLOAD_FAILED);
                self.shared
                    .update(|state| state.upload_failed(generation, message));
                Err(e)
            }
        }
    }

    /// Resolves once no upload, poll or download is in flight.
    pub async fn wait_until_settled(&self) -> Snapshot {
        let mut updates = self.subscribe();
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if !snapshot.phase.is_busy() || updates.changed().await.is_err() {
                return snapshot;
            }
        }
    }

    /// Clears inputs, job and error. Late responses for the discarded job
    /// are ignored.
    pub fn reset(&self) {
        self.shared.update(SessionState::reset);
        log::debug!("Session reset");
    }

    /// Opens the result in `viewer`. Does nothing when there is no result.
    pub fn open_result(&self, viewer: &dyn ResultViewer) -> Result<()> {
        let Some(url) = self.shared.read(|state| state.result_url().cloned()) else {
            return Ok(());
        };
        viewer.open(&url)
    }

    /// Fetches the result and hands it to `sink` under a name taken from
    /// the result address.
    ///
    /// Returns `Ok(None)` when there is no result to download.
    pub async fn download_result(&self, sink: &dyn SaveSink) -> Result<Option<PathBuf>> {
        let Some((generation, url)) = self.shared.update(SessionState::begin_download) else {
            return Ok(None);
        };

        match self.save_result(&url, sink).await {
            Ok(path) => {
                log::info!("Saved {} to {}", url, path.display());
                self.shared
                    .update(|state| state.download_finished(generation));
                Ok(Some(path))
            }
            Err(e) => {
                log::error!("Download of {} failed: {}", url, e);
                self.shared
                    .update(|state| state.download_failed(generation, DOWNLOAD_FAILED));
                Err(e)
            }
        }
    }

    async fn save_result(&self, url: &Url, sink: &dyn SaveSink) -> Result<PathBuf> {
        let image = self.api.fetch(url).await?;
        let handle = self.blobs.create(image.media_type, image.bytes);
        let blob = self
            .blobs
            .get(&handle.url())
            .ok_or_else(|| AppError::malformed("downloaded result vanished"))?;
        sink.save(&result_file_name(url), &blob)
        // `handle` drops here, releasing the local reference
    }
}

impl<A: PersonalizeApi + 'static> Drop for Session<A> {
    fn drop(&mut self) {
        // Releases previews and retires any polling task still running
        self.shared.update(SessionState::reset);
    }
}

/// The Polling Loop: query, apply under the live-job check, and wait the
/// fixed interval while the job is pending.
async fn poll_until_terminal<A: PersonalizeApi + 'static>(
    api: Arc<A>,
    shared: Arc<Shared>,
    generation: u64,
    task_id: String,
    interval: Duration,
) {
    let mut attempt: u64 = 0;
    loop {
        if !shared.read(|state| state.is_polling(generation, &task_id)) {
            log::debug!("Job {} no longer live, stopping", task_id);
            return;
        }

        attempt += 1;
        log::debug!("Polling job {} (attempt {})", task_id, attempt);

        let outcome = match api.status(&task_id).await {
            Ok(response) => {
                shared.update(|state| state.apply_status(generation, &task_id, &response))
            }
            Err(e) => {
                log::error!("Status check for job {} failed: {}", task_id, e);
                let message = e.user_message(STATUS_CHECK_FAILED);
                shared.update(|state| state.poll_failed(generation, &task_id, message))
            }
        };

        match outcome {
            PollOutcome::Pending => tokio::time::sleep(interval).await,
            PollOutcome::Done => {
                log::info!("Job {} done", task_id);
                return;
            }
            PollOutcome::Failed => {
                log::warn!("Job {} failed", task_id);
                return;
            }
            PollOutcome::Stale => {
                log::debug!("Discarded late response for job {}", task_id);
                return;
            }
        }
    }
}
