//! The standard Breakpad crash report form.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crash_common::{create_guid, ReportIdentifier};

use crate::{UploadError, UploadRequest};

/// Form field the minidump is attached under.
pub const MINIDUMP_FIELD: &str = "upload_file_minidump";

/// A minidump plus the metadata a Breakpad collector expects with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrashReport {
    pub product: String,
    pub version: String,
    /// Report identifier. Taken from the minidump file name when that is one.
    pub guid: String,
    /// Milliseconds the crashed process had been running.
    pub process_uptime: Option<u64>,
    /// Milliseconds the product has run across sessions.
    pub cumulative_uptime: Option<u64>,
    pub email: Option<String>,
    pub comments: Option<String>,
    pub minidump: PathBuf,
    /// Additional annotations sent as-is.
    pub extra: BTreeMap<String, String>,
}

impl CrashReport {
    pub fn new<P: Into<PathBuf>>(product: &str, version: &str, minidump: P) -> CrashReport {
        let minidump = minidump.into();
        let guid = guid_from_path(&minidump).unwrap_or_else(create_guid);
        CrashReport {
            product: product.to_owned(),
            version: version.to_owned(),
            guid: guid.to_string(),
            process_uptime: None,
            cumulative_uptime: None,
            email: None,
            comments: None,
            minidump,
            extra: BTreeMap::new(),
        }
    }

    /// Add an annotation; the standard fields take precedence over it.
    pub fn annotate<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.extra.insert(key.into(), value.into());
    }

    /// Build the request that submits this report to `url`.
    pub fn into_request<S: Into<String>>(self, url: S) -> Result<UploadRequest, UploadError> {
        if self.product.is_empty() {
            return Err(UploadError::MissingField("prod"));
        }
        if self.version.is_empty() {
            return Err(UploadError::MissingField("ver"));
        }
        if self.guid.is_empty() {
            return Err(UploadError::MissingField("guid"));
        }

        let mut request = UploadRequest::new(url);
        request.fields = self.extra;
        let standard = [
            ("prod", Some(self.product)),
            ("ver", Some(self.version)),
            ("guid", Some(self.guid)),
            ("ptime", self.process_uptime.map(|t| t.to_string())),
            ("ctime", self.cumulative_uptime.map(|t| t.to_string())),
            ("email", self.email),
            ("comments", self.comments),
        ];
        for (name, value) in standard {
            if let Some(value) = value {
                request.fields.insert(name.to_owned(), value);
            }
        }
        Ok(request.file(MINIDUMP_FIELD, self.minidump))
    }
}

fn guid_from_path(path: &Path) -> Option<ReportIdentifier> {
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_from_file_name() {
        let report = CrashReport::new(
            "myapp",
            "1.2.3",
            "/tmp/crashes/aabbccdd-1122-3344-55667788-99aabbcc.dmp",
        );
        assert_eq!(report.guid, "aabbccdd-1122-3344-55667788-99aabbcc");
    }

    #[test]
    fn test_fresh_guid_for_other_names() {
        let report = CrashReport::new("myapp", "1.2.3", "/tmp/crash.dmp");
        assert_eq!(report.guid.len(), 36);
        assert!(report.guid.parse::<ReportIdentifier>().is_ok());
    }

    #[test]
    fn test_into_request() {
        let mut report = CrashReport::new(
            "myapp",
            "1.2.3",
            "/tmp/crashes/aabbccdd-1122-3344-55667788-99aabbcc.dmp",
        );
        report.process_uptime = Some(1500);
        report.comments = Some("clicked the button".to_owned());
        report.annotate("channel", "beta");
        report.annotate("prod", "overridden");

        let request = report.into_request("https://crash.example.com/submit").unwrap();
        assert_eq!(request.url, "https://crash.example.com/submit");
        assert_eq!(request.fields["prod"], "myapp");
        assert_eq!(request.fields["ver"], "1.2.3");
        assert_eq!(request.fields["guid"], "aabbccdd-1122-3344-55667788-99aabbcc");
        assert_eq!(request.fields["ptime"], "1500");
        assert_eq!(request.fields["comments"], "clicked the button");
        assert_eq!(request.fields["channel"], "beta");
        assert!(!request.fields.contains_key("ctime"));
        assert!(!request.fields.contains_key("email"));
        assert_eq!(
            request.files[MINIDUMP_FIELD],
            PathBuf::from("/tmp/crashes/aabbccdd-1122-3344-55667788-99aabbcc.dmp")
        );
    }

    #[test]
    fn test_required_fields() {
        let report = CrashReport::new("", "1.2.3", "/tmp/crash.dmp");
        assert!(matches!(
            report.into_request("https://crash.example.com/submit"),
            Err(UploadError::MissingField("prod"))
        ));
        let report = CrashReport::new("myapp", "", "/tmp/crash.dmp");
        assert!(matches!(
            report.into_request("https://crash.example.com/submit"),
            Err(UploadError::MissingField("ver"))
        ));
    }
}
