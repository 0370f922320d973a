use crate::http::handler::{HandlerResponse, RequestHandler};
use crate::http::message::HttpRequest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// Serves the regular files in a single directory:
///
/// * `GET /` lists the files, separated by commas
/// * `GET /<name>` returns a file's content
/// * `POST /<name>` (over)writes a file with the request body
///
/// Names containing a path separator are rejected, so there is no way to access anything
///  outside the directory. Requests are handled one at a time.
pub struct FileServer {
    root: PathBuf,
    file_lock: Mutex<()>,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>) -> FileServer {
        FileServer {
            root: root.into(),
            file_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn list_files(&self) -> HandlerResponse {
        info!("responding to request for directory listing");
        match list_files(&self.root).await {
            Ok(names) => HandlerResponse::new(200, names.join(",")),
            Err(e) => {
                debug!("error listing {:?}: {}", self.root, e);
                HandlerResponse::new(500, "Failed to list files")
            }
        }
    }

    async fn read_file(&self, name: &str) -> HandlerResponse {
        match tokio::fs::read(self.root.join(name)).await {
            Ok(content) => {
                info!("returning requested file {}", name);
                HandlerResponse::new(200, normalize_line_endings(&content))
                    .with_header("Content-Type", content_type(name))
            }
            Err(e) => {
                debug!("error reading {:?}: {}", name, e);
                HandlerResponse::new(404, format!("No file exists with name '{}'", name))
            }
        }
    }

    async fn write_file(&self, name: &str, content: &[u8]) -> HandlerResponse {
        match tokio::fs::write(self.root.join(name), content).await {
            Ok(()) => {
                info!("successfully written {}", name);
                HandlerResponse::new(200, "Successfully written content to file")
            }
            Err(e) => {
                debug!("error writing {:?}: {}", name, e);
                HandlerResponse::new(500, format!("Failed to write to file '{}'", name))
            }
        }
    }
}

#[async_trait]
impl RequestHandler for FileServer {
    async fn handle(&self, request: &HttpRequest) -> HandlerResponse {
        let _guard = self.file_lock.lock().await;
        trace!("acquired file lock");

        match (request.method.as_str(), request.path_param()) {
            (_, Some(name)) if is_forbidden(name) => {
                info!("access denied to {:?}", name);
                HandlerResponse::new(403, format!("Access Forbidden: '{}' is outside server root directory", name))
            }
            ("GET", None) => self.list_files().await,
            ("GET", Some(name)) => self.read_file(name).await,
            ("POST", Some(name)) => self.write_file(name, &request.body).await,
            ("POST", None) => HandlerResponse::new(400, "POST requires a file name"),
            (method, _) => HandlerResponse::new(501, format!("Method {} is not supported", method)),
        }
    }
}

fn is_forbidden(name: &str) -> bool {
    name.contains('/') || name.contains('\\') || name == ".."
}

async fn list_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut result = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            result.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    result.sort();
    Ok(result)
}

fn content_type(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("html") => "text/html",
        _ => "text/plain",
    }
}

fn normalize_line_endings(content: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(content.len());
    let mut iter = content.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        result.push(b);
    }
    result
}
