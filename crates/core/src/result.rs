//! Result resolution and retrieval.
//!
//! The service hands back result references that are either absolute or
//! relative to its own base address. This module turns them into absolute
//! addresses, names downloaded files, and defines where results end up.

use crate::blob::Blob;
use crate::error::{AppError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use url::Url;

/// File name used when the result address has no usable last segment.
pub const DEFAULT_RESULT_FILE_NAME: &str = "result.png";

/// Resolves a result reference against the service base address.
///
/// Absolute http(s) references are returned unchanged. Anything else is
/// appended to the base address, keeping any path the base already has.
///
/// # Example
///
/// ```
/// use storyface_core::result::resolve_result_url;
/// use url::Url;
///
/// let base = Url::parse("http://svc").unwrap();
/// let url = resolve_result_url(&base, "/files/out.png").unwrap();
/// assert_eq!(url.as_str(), "http://svc/files/out.png");
/// ```
pub fn resolve_result_url(base: &Url, reference: &str) -> Result<Url> {
    let reference = reference.trim();
    if let Ok(url) = Url::parse(reference) {
        if matches!(url.scheme(), "http" | "https") {
            return Ok(url);
        }
    }

    let base = base.as_str().trim_end_matches('/');
    let joined = if reference.starts_with('/') {
        format!("{}{}", base, reference)
    } else {
        format!("{}/{}", base, reference)
    };

    Ok(Url::parse(&joined)?)
}

/// Synthesizes a download file name from the last path segment.
pub fn result_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_RESULT_FILE_NAME.to_string())
}

/// Somewhere a finished result can be viewed.
pub trait ResultViewer: Send + Sync {
    fn open(&self, url: &Url) -> Result<()>;
}

/// Opens results with the platform's default handler.
///
/// The opener is spawned detached with no stdio, so nothing flows back
/// from the viewing context into the session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemViewer;

impl SystemViewer {
    fn command(url: &Url) -> Command {
        #[cfg(target_os = "macos")]
        let mut cmd = Command::new("open");
        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]);
            cmd
        };
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let mut cmd = Command::new("xdg-open");

        cmd.arg(url.as_str());
        cmd
    }
}

impl ResultViewer for SystemViewer {
    fn open(&self, url: &Url) -> Result<()> {
        Self::command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| AppError::viewer(format!("Failed to open {}: {}", url, e)))
    }
}

/// Where downloaded results are saved.
pub trait SaveSink: Send + Sync {
    fn save(&self, file_name: &str, blob: &Blob) -> Result<PathBuf>;
}

/// Saves downloads into a directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveSink for DirectorySink {
    fn save(&self, file_name: &str, blob: &Blob) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        // Never let a service-chosen name escape the directory
        let file_name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_RESULT_FILE_NAME.to_string());
        let path = self.dir.join(file_name);
        fs::write(&path, &blob.bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_relative_reference_is_prefixed() {
        let url = resolve_result_url(&base("http://svc"), "/files/out.png").unwrap();
        assert_eq!(url.as_str(), "http://svc/files/out.png");

        let url = resolve_result_url(&base("http://svc/api/"), "result/abc/final.png").unwrap();
        assert_eq!(url.as_str(), "http://svc/api/result/abc/final.png");
    }

    #[test]
    fn test_absolute_reference_is_unchanged() {
        let url = resolve_result_url(&base("http://svc"), "http://cdn/x.png").unwrap();
        assert_eq!(url.as_str(), "http://cdn/x.png");

        let url = resolve_result_url(&base("http://svc"), "https://cdn/y.png").unwrap();
        assert_eq!(url.as_str(), "https://cdn/y.png");
    }

    #[test]
    fn test_file_name() {
        let url = base("http://svc/a/b/result.png");
        assert_eq!(result_file_name(&url), "result.png");

        let url = base("http://svc/result/abc/stylized.png");
        assert_eq!(result_file_name(&url), "stylized.png");

        assert_eq!(result_file_name(&base("http://svc/")), DEFAULT_RESULT_FILE_NAME);
        assert_eq!(result_file_name(&base("http://svc/a/")), DEFAULT_RESULT_FILE_NAME);
    }

    #[test]
    fn test_directory_sink() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));
        let blob = Blob {
            media_type: "image/png".into(),
            bytes: Arc::from(vec![7u8, 8, 9]),
        };

        let path = sink.save("../final.png", &blob).unwrap();
        assert_eq!(path, dir.path().join("out").join("final.png"));
        assert_eq!(fs::read(path).unwrap(), vec![7, 8, 9]);
    }
}
