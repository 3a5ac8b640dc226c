//! Storyface Core Library
//!
//! This library provides the client side of the Storyface photo
//! personalization workflow: a user picks a photo plus a style template
//! and/or a free-text prompt, the inputs are uploaded to the remote
//! personalization service, the resulting job is polled until it finishes,
//! and the produced illustration can be opened or downloaded.
//!
//! # Overview
//!
//! - **Selection & Validation**: primary photo, template and prompt, held in
//!   the exclusively-owned record in [`state`]
//! - **Submission**: multipart upload through the [`api::PersonalizeApi`] seam
//! - **Polling Loop**: fixed-interval status queries on a spawned task, see
//!   [`session`]
//! - **Result retrieval**: URL resolution, viewing and saving via [`result`]
//!
//! # Quick Start
//!
//! ```ignore
//! use storyface_core::{ImageFile, Storyface};
//!
//! let app = Storyface::new()?;
//! let session = app.session();
//!
//! session.select_primary_image(ImageFile::from_path("me.jpg")?)?;
//! session.set_prompt("gentle watercolor storybook");
//! session.submit().await?;
//! let done = session.wait_until_settled().await;
//! ```
//!
//! # Module Structure
//!
//! - [`api`]: Service trait and reqwest client
//! - [`blob`]: Locally-owned preview/download references
//! - [`config`]: Configuration loading and management
//! - [`error`]: Error types and result aliases
//! - [`media`]: Selected image files and media type detection
//! - [`models`]: Wire types of the service API
//! - [`result`]: Result resolution, viewers and save sinks
//! - [`session`]: The async session controller
//! - [`settings`]: Persisted user preferences
//! - [`state`]: Phase, inputs, job and pure transitions

pub mod api;
pub mod blob;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod result;
pub mod session;
pub mod settings;
pub mod state;

// Re-export primary types for convenience
pub use api::{HttpClient, PersonalizeApi};
pub use blob::{Blob, BlobStore};
pub use config::Config;
pub use error::{AppError, Result};
pub use media::ImageFile;
pub use result::{DirectorySink, ResultViewer, SaveSink, SystemViewer};
pub use session::Session;
pub use settings::Settings;
pub use state::{Job, Phase, Snapshot};

use std::sync::Arc;

/// Main entry point for Storyface.
///
/// Holds the configuration and one shared HTTP client, and hands out
/// sessions bound to them.
pub struct Storyface {
    config: Config,
    client: Arc<HttpClient>,
}

impl Storyface {
    /// Creates an instance from environment configuration (including
    /// `.env` files) and persisted settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new() -> Result<Self> {
        let config = Config::load_with(&Settings::load())?;
        Self::with_config(config)
    }

    /// Creates an instance with custom configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        let client = Arc::new(HttpClient::new(&config)?);
        Ok(Self { config, client })
    }

    /// Starts a new, idle session.
    pub fn session(&self) -> Session<HttpClient> {
        Session::new(self.client.clone(), &self.config)
    }

    /// Returns a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Loads environment variables from a `.env` file if present.
///
/// Call this once at application startup.
pub fn init() {
    let _ = dotenvy::dotenv();
}
