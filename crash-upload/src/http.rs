//! The HTTP(S) transport, built on a blocking reqwest client.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use reqwest::{redirect, Certificate, Proxy};
use tracing::{debug, trace};

use crate::{Transport, UploadError, UploadRequest, UploadResponse};

/// How to reach the collection server.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Proxy to send through, as `host:port` or a URL.
    ///
    /// Defaults to None (connect directly).
    pub proxy: Option<String>,

    /// Basic-auth credentials for the proxy, as `user:password`.
    ///
    /// Defaults to None.
    pub proxy_credentials: Option<String>,

    /// A PEM bundle of CA certificates to trust when verifying the server,
    /// in addition to the built-in roots.
    ///
    /// Defaults to None.
    pub ca_certificate_file: Option<PathBuf>,

    /// A maximum time limit for the whole request, including sending the
    /// files. Callers that need cancellation should run the upload on a worker
    /// thread of their own.
    ///
    /// Defaults to 60 seconds.
    pub timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            proxy_credentials: None,
            ca_certificate_file: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Sends requests as `multipart/form-data` POSTs.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(options: &UploadOptions) -> Result<Self, UploadError> {
        // A redirected POST is replayed as a bodyless GET, so the minidump
        // would never arrive. Hand 3xx answers back as failures instead.
        let mut builder = Client::builder()
            .timeout(options.timeout)
            .redirect(redirect::Policy::none());

        if let Some(proxy) = &options.proxy {
            let url = if proxy.contains("://") {
                proxy.clone()
            } else {
                format!("http://{}", proxy)
            };
            let mut proxy = Proxy::all(url.as_str()).map_err(|e| {
                UploadError::Config(format!("bad proxy {:?}: {}", proxy, error_chain(&e)))
            })?;
            if let Some(credentials) = &options.proxy_credentials {
                let (user, password) = credentials
                    .split_once(':')
                    .unwrap_or((credentials.as_str(), ""));
                proxy = proxy.basic_auth(user, password);
            }
            builder = builder.proxy(proxy);
        } else if options.proxy_credentials.is_some() {
            debug!("upload: proxy credentials given without a proxy, ignoring them");
        }

        if let Some(path) = &options.ca_certificate_file {
            let pem = fs::read(path).map_err(|source| UploadError::FileUnreadable {
                path: path.clone(),
                source,
            })?;
            let certificates = Certificate::from_pem_bundle(&pem).map_err(|e| {
                UploadError::Config(format!("bad CA bundle {:?}: {}", path, error_chain(&e)))
            })?;
            if certificates.is_empty() {
                return Err(UploadError::Config(format!(
                    "no certificates in CA bundle {:?}",
                    path
                )));
            }
            debug!(
                "upload: trusting {} extra CA certificates from {}",
                certificates.len(),
                path.display()
            );
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        let client = builder
            .build()
            .map_err(|e| UploadError::Config(error_chain(&e)))?;
        Ok(ReqwestTransport { client })
    }

    fn form(request: &UploadRequest) -> Result<multipart::Form, UploadError> {
        let mut form = multipart::Form::new();
        for (name, value) in &request.fields {
            form = form.text(name.clone(), value.clone());
        }
        for (name, path) in &request.files {
            trace!("upload: attaching {} as {}", path.display(), name);
            form = form
                .file(name.clone(), path)
                .map_err(|source| UploadError::FileUnreadable {
                    path: path.clone(),
                    source,
                })?;
        }
        Ok(form)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &UploadRequest) -> Result<UploadResponse, UploadError> {
        let form = ReqwestTransport::form(request)?;
        let response = self
            .client
            .post(&request.url)
            .multipart(form)
            .send()
            .map_err(|e| UploadError::Transport(error_chain(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| UploadError::Transport(error_chain(&e)))?;
        if !status.is_success() {
            return Err(UploadError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(UploadResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// reqwest's own messages are terse ("error sending request"), the useful part
/// is usually further down the source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = UploadOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert!(options.proxy.is_none());
        assert!(ReqwestTransport::new(&options).is_ok());
    }

    #[test]
    fn test_proxy_with_credentials() {
        let options = UploadOptions {
            proxy: Some("proxy.example.com:3128".to_owned()),
            proxy_credentials: Some("crash:hunter2".to_owned()),
            ..UploadOptions::default()
        };
        assert!(ReqwestTransport::new(&options).is_ok());
    }

    #[test]
    fn test_missing_ca_file() {
        let options = UploadOptions {
            ca_certificate_file: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..UploadOptions::default()
        };
        assert!(matches!(
            ReqwestTransport::new(&options),
            Err(UploadError::FileUnreadable { .. })
        ));
    }

    #[test]
    fn test_ca_bundle() {
        let bundle = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/ca-bundle.pem");
        let options = UploadOptions {
            ca_certificate_file: Some(bundle),
            ..UploadOptions::default()
        };
        assert!(ReqwestTransport::new(&options).is_ok());
    }

    #[test]
    fn test_ca_bundle_without_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        fs::write(&path, "no certificates in here\n").unwrap();
        let options = UploadOptions {
            ca_certificate_file: Some(path),
            ..UploadOptions::default()
        };
        assert!(matches!(
            ReqwestTransport::new(&options),
            Err(UploadError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_reported_before_sending() {
        let transport = ReqwestTransport::new(&UploadOptions::default()).unwrap();
        let request = UploadRequest::new("http://127.0.0.1:9/submit")
            .field("prod", "myapp")
            .file("upload_file_minidump", "/nonexistent/crash.dmp");
        let err = transport.send(&request).unwrap_err();
        assert!(matches!(err, UploadError::FileUnreadable { .. }));
        assert_eq!(err.status_code(), 0);
    }
}
