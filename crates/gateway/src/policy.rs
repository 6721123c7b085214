//! File identification and extension policy.

use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use micro_icap::protocol::HttpEnvelope;

use crate::config::{ServiceConfig, WILDCARD, normalize_extension};
use crate::scanner::FileMetadata;

const UNNAMED_FILE: &str = "unnamed_file";
const UNKNOWN_EXTENSION: &str = "unknown";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileAction {
    Process,
    Reject,
    Bypass,
}

/// Identifies the file carried by `envelope`.
///
/// The name comes from the `Content-Disposition` filename, otherwise from the last
/// segment of the HTTP request path. The extension comes from the name, otherwise from
/// the `Content-Type`.
pub fn resolve_metadata(envelope: &HttpEnvelope, size: u64) -> FileMetadata {
    let headers = envelope.body_headers();

    let content_type = headers
        .and_then(|headers| headers.get(CONTENT_TYPE))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let file_name = headers
        .and_then(|headers| headers.get(CONTENT_DISPOSITION))
        .and_then(|value| value.to_str().ok())
        .and_then(disposition_filename)
        .or_else(|| {
            let request = envelope.request.as_ref()?;
            let segment = request.uri().path().rsplit('/').next()?;
            (!segment.is_empty()).then(|| segment.to_string())
        })
        .unwrap_or_else(|| UNNAMED_FILE.to_string());

    let extension = match file_name.rsplit_once('.') {
        Some((_, extension)) if !extension.is_empty() => normalize_extension(extension),
        _ => content_type.as_deref().and_then(extension_of_mime).unwrap_or_else(|| UNKNOWN_EXTENSION.to_string()),
    };

    FileMetadata { file_name, extension, content_type, size }
}

fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|param| {
        let (key, name) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = name.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn extension_of_mime(content_type: &str) -> Option<String> {
    let mime = content_type.parse::<mime::Mime>().ok()?;

    let extension = match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("text", "plain") => "txt",
        ("text", "html") => "html",
        ("text", "css") => "css",
        ("text" | "application", "javascript") => "js",
        ("image", "jpeg") => "jpg",
        ("image", "png") => "png",
        ("image", "gif") => "gif",
        ("image", "svg") => "svg",
        ("application", "pdf") => "pdf",
        ("application", "json") => "json",
        ("application", "octet-stream") => "bin",
        ("application", "x-msdownload") => "exe",
        ("application", "x-zip-compressed") => "zip",
        (_, subtype) => return Some(normalize_extension(subtype)),
    };
    Some(extension.to_string())
}

/// Decides what to do with a file of `extension`.
///
/// Explicit entries win in the order process, reject, bypass; otherwise the list holding
/// the wildcard decides.
pub fn classify(config: &ServiceConfig, extension: &str) -> FileAction {
    let extension = normalize_extension(extension);
    let lists = [
        (&config.process_extensions, FileAction::Process),
        (&config.reject_extensions, FileAction::Reject),
        (&config.bypass_extensions, FileAction::Bypass),
    ];

    let listed = |list: &Vec<String>, wanted: &str| list.iter().any(|item| normalize_extension(item) == wanted);

    lists
        .iter()
        .find(|(list, _)| listed(list, &extension))
        .or_else(|| lists.iter().find(|(list, _)| listed(list, WILDCARD)))
        .map_or(FileAction::Process, |(_, action)| *action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};
    use serde_json::json;

    fn respmod(uri: &str, response: Response<()>) -> HttpEnvelope {
        let request = Request::builder().uri(uri).body(()).unwrap();
        HttpEnvelope::response(Some(request), response)
    }

    #[test]
    fn test_name_from_content_disposition() {
        let response = Response::builder()
            .header("content-disposition", "attachment; filename=\"Report.PDF\"")
            .header("content-type", "application/pdf")
            .body(())
            .unwrap();

        let metadata = resolve_metadata(&respmod("/download?id=1", response), 10);
        assert_eq!(metadata.file_name, "Report.PDF");
        assert_eq!(metadata.extension, "pdf");
        assert_eq!(metadata.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(metadata.size, 10);
    }

    #[test]
    fn test_name_from_request_path() {
        let response = Response::builder().body(()).unwrap();
        let metadata = resolve_metadata(&respmod("http://example.com/files/setup.exe", response), 0);
        assert_eq!(metadata.file_name, "setup.exe");
        assert_eq!(metadata.extension, "exe");
    }

    #[test]
    fn test_extension_from_content_type() {
        let response = Response::builder().header("content-type", "text/html; charset=utf-8").body(()).unwrap();
        let metadata = resolve_metadata(&respmod("/", response), 0);
        assert_eq!(metadata.file_name, UNNAMED_FILE);
        assert_eq!(metadata.extension, "html");

        let response = Response::builder().header("content-type", "application/zip").body(()).unwrap();
        assert_eq!(resolve_metadata(&respmod("/download", response), 0).extension, "zip");

        let response = Response::builder().body(()).unwrap();
        assert_eq!(resolve_metadata(&respmod("/download", response), 0).extension, UNKNOWN_EXTENSION);
    }

    #[test]
    fn test_classify_priority() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "name": "av",
            "resp_mode": true,
            "process_extensions": ["*"],
            "reject_extensions": ["exe", ".BAT"],
            "bypass_extensions": ["png"]
        }))
        .unwrap();

        assert_eq!(classify(&config, "exe"), FileAction::Reject);
        assert_eq!(classify(&config, "bat"), FileAction::Reject);
        assert_eq!(classify(&config, "PNG"), FileAction::Bypass);
        assert_eq!(classify(&config, "pdf"), FileAction::Process);
    }

    #[test]
    fn test_classify_bypass_wildcard() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "name": "av",
            "resp_mode": true,
            "process_extensions": ["pdf"],
            "bypass_extensions": ["*"]
        }))
        .unwrap();

        assert_eq!(classify(&config, "pdf"), FileAction::Process);
        assert_eq!(classify(&config, "txt"), FileAction::Bypass);
    }
}
