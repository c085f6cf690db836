//! Submitting crash reports to a collection server.
//!
//! [`HttpUpload`] sends an [`UploadRequest`] (text form fields plus one or more
//! files, usually a single minidump) as a `multipart/form-data` POST. Field
//! names are checked before anything touches the network. The call blocks
//! until the server answers or the transport gives up, and never retries on
//! its own; wrap the transport in a [`RetryTransport`] for that.
//!
//! [`CrashReport`] fills in the standard Breakpad crash report fields.
//!
//! # Examples
//!
//! ```no_run
//! use crash_upload::{HttpUpload, UploadOptions, UploadRequest};
//!
//! # fn foo() -> Result<(), crash_upload::UploadError> {
//! let upload = HttpUpload::new(&UploadOptions::default())?;
//! let request = UploadRequest::new("https://crash.example.com/submit")
//!     .field("prod", "myapp")
//!     .field("ver", "1.2.3")
//!     .file("upload_file_minidump", "/tmp/crashes/report.dmp");
//! let response = upload.send(&request)?;
//! println!("{} {}", response.status, response.body);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use reqwest::Url;
use tracing::{debug, warn};

mod http;
mod report;
mod retry;

pub use crate::http::{ReqwestTransport, UploadOptions};
pub use crate::report::{CrashReport, MINIDUMP_FIELD};
pub use crate::retry::{RetryPolicy, RetryTransport};

/// Everything needed to submit one report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// The `http` or `https` URL to POST to.
    pub url: String,
    /// Text form fields, by field name.
    pub fields: BTreeMap<String, String>,
    /// Files to attach, by field name.
    pub files: BTreeMap<String, PathBuf>,
}

impl UploadRequest {
    pub fn new<S: Into<String>>(url: S) -> UploadRequest {
        UploadRequest {
            url: url.into(),
            ..UploadRequest::default()
        }
    }

    /// Add a text form field, replacing any previous value for `name`.
    pub fn field<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> UploadRequest {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Attach the file at `path` under the form field `name`.
    pub fn file<K: Into<String>, P: Into<PathBuf>>(mut self, name: K, path: P) -> UploadRequest {
        self.files.insert(name.into(), path.into());
        self
    }
}

/// What the server sent back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body, unparsed.
    pub body: String,
}

/// Errors encountered while submitting a report.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid form field name {0:?}: must be printable ASCII without '\"'")]
    InvalidFieldName(String),
    #[error("Invalid upload URL {0:?}")]
    InvalidUrl(String),
    #[error("Unsupported upload URL scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("Could not read {path:?}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid transport configuration: {0}")]
    Config(String),
    #[error("Upload failed: {0}")]
    Transport(String),
    #[error("Server responded with HTTP status {status}")]
    HttpStatus { status: u16, body: String },
    #[error("Missing required crash report field {0:?}")]
    MissingField(&'static str),
}

impl UploadError {
    /// The HTTP status the server answered with, or 0 if no response arrived.
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::HttpStatus { status, .. } => *status,
            _ => 0,
        }
    }

    /// The response body, if the server answered.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            UploadError::HttpStatus { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Whether trying the same request again might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Transport(_) => true,
            UploadError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns just the name of the error, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            UploadError::InvalidFieldName(_) => "InvalidFieldName",
            UploadError::InvalidUrl(_) => "InvalidUrl",
            UploadError::UnsupportedScheme(_) => "UnsupportedScheme",
            UploadError::FileUnreadable { .. } => "FileUnreadable",
            UploadError::Config(_) => "Config",
            UploadError::Transport(_) => "Transport",
            UploadError::HttpStatus { .. } => "HttpStatus",
            UploadError::MissingField(_) => "MissingField",
        }
    }
}

/// Something that can deliver an already validated [`UploadRequest`].
pub trait Transport {
    fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        (**self).send(request)
    }
}

/// Whether `name` can be embedded verbatim in a multipart part header.
///
/// Names become `Content-Disposition: form-data; name="..."`, so anything
/// outside printable ASCII or a `"` would corrupt the request framing.
pub fn is_valid_field_name(name: &str) -> bool {
    name.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != b'"')
}

/// Check everything about `request` that can be checked without I/O.
pub fn validate_request(request: &UploadRequest) -> Result<(), UploadError> {
    for name in request.fields.keys().chain(request.files.keys()) {
        if !is_valid_field_name(name) {
            return Err(UploadError::InvalidFieldName(name.clone()));
        }
    }
    let url = Url::parse(&request.url).map_err(|_| UploadError::InvalidUrl(request.url.clone()))?;
    match url.scheme() {
        "https" => {}
        "http" => warn!("upload: {} is not encrypted", url),
        other => return Err(UploadError::UnsupportedScheme(other.to_owned())),
    }
    Ok(())
}

/// Submits crash reports through a [`Transport`].
pub struct HttpUpload<T = ReqwestTransport> {
    transport: T,
}

impl HttpUpload<ReqwestTransport> {
    /// An uploader sending over HTTP(S) with `options`.
    pub fn new(options: &UploadOptions) -> Result<Self, UploadError> {
        Ok(HttpUpload {
            transport: ReqwestTransport::new(options)?,
        })
    }
}

impl<T: Transport> HttpUpload<T> {
    pub fn with_transport(transport: T) -> Self {
        HttpUpload { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Validate `request` and send it.
    ///
    /// Validation failures are returned before the transport is touched.
    pub fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        validate_request(request)?;
        debug!(
            "upload: sending {} fields and {} files to {}",
            request.fields.len(),
            request.files.len(),
            request.url
        );
        let response = self.transport.send(request)?;
        debug!("upload: server answered {}", response.status);
        Ok(response)
    }
}
