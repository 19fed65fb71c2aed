//! Resolving source locators into loaded documents.

use crate::pdf::{DocumentInfo, PdfEngine, PdfError};
use log::{info, warn};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur while loading a document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Network error fetching {url}: {detail}")]
    Network { url: String, detail: String },

    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Unsupported locator scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Document is password protected")]
    Encrypted,

    #[error("PDF engine unavailable: {0}")]
    Engine(String),

    #[error("Loader stopped: {0}")]
    Worker(String),

    #[error("Load was superseded by a newer request")]
    Superseded,
}

impl serde::Serialize for LoadError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<PdfError> for LoadError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::InitError(detail) => LoadError::Engine(detail),
            PdfError::Encrypted => LoadError::Encrypted,
            other => LoadError::Malformed(other.to_string()),
        }
    }
}

/// Where a document comes from.
#[derive(Debug, Clone)]
pub enum SourceLocator {
    Url(Url),
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl SourceLocator {
    /// Interpret a locator string the way launch arguments are interpreted:
    /// remote URLs stay URLs, `file://` URLs and percent-encoded paths become
    /// filesystem paths, anything else is a path.
    pub fn parse(input: &str) -> Self {
        if let Ok(url) = Url::parse(input) {
            match url.scheme() {
                "file" => {
                    if let Ok(path) = url.to_file_path() {
                        return SourceLocator::Path(path);
                    }
                }
                // Single letters are Windows drive prefixes, not schemes
                scheme if scheme.len() > 1 => return SourceLocator::Url(url),
                _ => {}
            }
        }

        // Handle URL-encoded paths (e.g., spaces as %20)
        if let Ok(decoded) = urlencoding::decode(input) {
            if decoded != input && Path::new(decoded.as_ref()).exists() {
                return SourceLocator::Path(PathBuf::from(decoded.into_owned()));
            }
        }

        SourceLocator::Path(PathBuf::from(input))
    }
}

impl From<&str> for SourceLocator {
    fn from(input: &str) -> Self {
        SourceLocator::parse(input)
    }
}

impl From<Vec<u8>> for SourceLocator {
    fn from(bytes: Vec<u8>) -> Self {
        SourceLocator::Bytes(bytes.into())
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Url(url) => write!(f, "{}", url),
            SourceLocator::Path(path) => write!(f, "{}", path.display()),
            SourceLocator::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

struct DocumentInner {
    bytes: Arc<[u8]>,
    info: DocumentInfo,
    origin: String,
}

/// A successfully loaded document. Cheap to clone.
#[derive(Clone)]
pub struct DocumentHandle {
    inner: Arc<DocumentInner>,
}

impl DocumentHandle {
    pub fn new(bytes: Arc<[u8]>, info: DocumentInfo, origin: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                bytes,
                info,
                origin: origin.into(),
            }),
        }
    }

    /// Raw document bytes (engines reopen them per call)
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.inner.bytes)
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.inner.info
    }

    pub fn page_count(&self) -> u32 {
        self.inner.info.page_count
    }

    /// The locator the document was loaded from.
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("origin", &self.inner.origin)
            .field("pages", &self.inner.info.page_count)
            .field("bytes", &self.inner.bytes.len())
            .finish()
    }
}

/// Fetches document bytes and opens them through the engine.
#[derive(Clone)]
pub struct DocumentLoader {
    engine: Arc<dyn PdfEngine>,
    agent: ureq::Agent,
    max_bytes: u64,
}

impl DocumentLoader {
    pub fn new(engine: Arc<dyn PdfEngine>, timeout: Duration, max_bytes: u64) -> Self {
        Self {
            engine,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            max_bytes,
        }
    }

    /// Load a document. Fetching and parsing run on the blocking pool.
    pub async fn load(&self, locator: SourceLocator) -> Result<DocumentHandle, LoadError> {
        let origin = locator.to_string();
        info!("Loading document from {}", origin);

        let agent = self.agent.clone();
        let max_bytes = self.max_bytes;
        let bytes = tokio::task::spawn_blocking(move || fetch(&agent, locator, max_bytes))
            .await
            .map_err(|e| LoadError::Worker(e.to_string()))??;

        let engine = Arc::clone(&self.engine);
        let doc_bytes = Arc::clone(&bytes);
        let info = tokio::task::spawn_blocking(move || engine.open(&doc_bytes))
            .await
            .map_err(|e| LoadError::Worker(e.to_string()))?
            .map_err(|e| {
                warn!("Engine rejected {}: {}", origin, e);
                LoadError::from(e)
            })?;

        info!("Loaded {} ({} pages)", origin, info.page_count);
        Ok(DocumentHandle::new(bytes, info, origin))
    }
}

fn fetch(agent: &ureq::Agent, locator: SourceLocator, max_bytes: u64) -> Result<Arc<[u8]>, LoadError> {
    let bytes: Arc<[u8]> = match locator {
        SourceLocator::Bytes(bytes) => bytes,
        SourceLocator::Path(path) => match std::fs::read(&path) {
            Ok(bytes) => bytes.into(),
            Err(source) => return Err(LoadError::Io { path, source }),
        },
        SourceLocator::Url(url) => match url.scheme() {
            "http" | "https" => fetch_http(agent, &url, max_bytes)?.into(),
            other => return Err(LoadError::UnsupportedScheme(other.to_string())),
        },
    };

    if bytes.len() as u64 > max_bytes {
        return Err(LoadError::TooLarge { limit: max_bytes });
    }
    Ok(bytes)
}

fn fetch_http(agent: &ureq::Agent, url: &Url, max_bytes: u64) -> Result<Vec<u8>, LoadError> {
    let response = agent.get(url.as_str()).call().map_err(|e| match e {
        ureq::Error::Status(status, _) => LoadError::Http {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => LoadError::Network {
            url: url.to_string(),
            detail: transport.to_string(),
        },
    })?;

    // Read one byte past the limit so oversize bodies are detected
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| LoadError::Network {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
    Ok(bytes)
}

/// Serve a single HTTP response on a loopback port.
#[cfg(test)]
pub(crate) fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
    use std::io::Write;
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 2048];
            let _ = stream.read(&mut request);
            let head = format!(
                "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body);
        }
    });
    format!("http://{}/doc.pdf", addr)
}
