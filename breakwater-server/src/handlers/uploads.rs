use std::fs;

use chrono::Utc;
use tracing::warn;

use breakwater_http::Request;

use crate::path::url_decode;

#[derive(Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored { filename: String, size: usize },
    Failed(u16),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { filename: String },
    Failed(u16),
}

#[derive(Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Saved { path: String },
    Failed(u16),
}

/// POST upload. `multipart/form-data` bodies have the first part's content
/// extracted and its `filename="..."` honored; anything else is stored
/// verbatim under a synthesized name.
pub fn handle_post_upload(request: &Request, upload_path: &str) -> UploadOutcome {
    if request.body.is_empty() {
        return UploadOutcome::Failed(400);
    }

    let content_type = request.header("content-type").unwrap_or("");
    let (filename, content) = if content_type.starts_with("multipart/form-data") {
        match parse_multipart(content_type, &request.body) {
            Some(part) => part,
            None => return UploadOutcome::Failed(400),
        }
    } else {
        (None, request.body.clone())
    };

    let filename =
        filename.unwrap_or_else(|| format!("upload_{}.bin", Utc::now().timestamp()));
    let size = content.len();

    let full_path = format!("{}/{}", upload_path.trim_end_matches('/'), filename);
    match fs::write(&full_path, content) {
        Ok(()) => UploadOutcome::Stored { filename, size },
        Err(err) => {
            warn!(path = %full_path, "upload write failed: {err}");
            UploadOutcome::Failed(500)
        }
    }
}

/// First part of a multipart body: content between the part's header
/// terminator and the `\r\n` preceding the next boundary marker.
fn parse_multipart(content_type: &str, body: &[u8]) -> Option<(Option<String>, Vec<u8>)> {
    let boundary_value = content_type.split("boundary=").nth(1)?;
    let boundary = format!("--{boundary_value}");

    let start = find(body, boundary.as_bytes())?;
    let headers_end = find(&body[start..], b"\r\n\r\n")? + start;
    let content_start = headers_end + 4;
    let content_end = find(&body[content_start..], boundary.as_bytes())? + content_start;
    let content_end = content_end.checked_sub(2)?;
    if content_end < content_start {
        return None;
    }

    let part_headers = &body[start..headers_end];
    let filename = extract_filename(part_headers);

    Some((filename, body[content_start..content_end].to_vec()))
}

fn extract_filename(part_headers: &[u8]) -> Option<String> {
    let marker = b"filename=\"";
    let start = find(part_headers, marker)? + marker.len();
    let end = find(&part_headers[start..], b"\"")? + start;
    let name = String::from_utf8_lossy(&part_headers[start..end]).into_owned();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// DELETE removes a single uploaded file addressed by the URI's basename.
pub fn handle_delete(uri: &str, upload_path: &str) -> DeleteOutcome {
    let basename = uri.rsplit('/').next().unwrap_or("");
    let filename = url_decode(basename);

    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
    {
        return DeleteOutcome::Failed(400);
    }

    let full_path = format!("{}/{}", upload_path.trim_end_matches('/'), filename);
    let metadata = match fs::metadata(&full_path) {
        Ok(metadata) => metadata,
        Err(_) => return DeleteOutcome::Failed(404),
    };
    if metadata.is_dir() {
        return DeleteOutcome::Failed(400);
    }

    match fs::remove_file(&full_path) {
        Ok(()) => DeleteOutcome::Deleted { filename },
        Err(err) => {
            warn!(path = %full_path, "delete failed: {err}");
            DeleteOutcome::Failed(500)
        }
    }
}

/// PUT writes the body under a timestamped name in the upload directory.
pub fn handle_put(request: &Request, upload_path: &str) -> PutOutcome {
    let filename = format!("uploaded_file_{}", Utc::now().timestamp());
    let full_path = format!("{}/{}", upload_path.trim_end_matches('/'), filename);

    match fs::write(&full_path, &request.body) {
        Ok(()) => PutOutcome::Saved { path: full_path },
        Err(err) => {
            warn!(path = %full_path, "put write failed: {err}");
            PutOutcome::Failed(500)
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakwater_http::{parse_request, ParseOutcome};

    fn request_from(raw: &[u8]) -> Request {
        match parse_request(raw) {
            ParseOutcome::Complete { request, .. } => request,
            other => panic!("fixture request did not parse: {other:?}"),
        }
    }

    fn multipart_request(filename: &str, content: &str) -> Request {
        let body = format!(
            "--XBOUND\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n--XBOUND--\r\n"
        );
        let raw = format!(
            "POST /upload HTTP/1.1\r\nHost: x\r\n\
             Content-Type: multipart/form-data; boundary=XBOUND\r\n\
             Content-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        request_from(raw.as_bytes())
    }

    #[test]
    fn stores_multipart_upload_under_given_name() {
        let dir = tempfile::tempdir().unwrap();
        let request = multipart_request("notes.txt", "file contents");

        match handle_post_upload(&request, dir.path().to_str().unwrap()) {
            UploadOutcome::Stored { filename, size } => {
                assert_eq!(filename, "notes.txt");
                assert_eq!(size, 13);
            }
            other => panic!("expected stored, got {other:?}"),
        }
        let stored = std::fs::read(dir.path().join("notes.txt")).unwrap();
        assert_eq!(stored, b"file contents");
    }

    #[test]
    fn plain_body_gets_synthesized_name() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_from(
            b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\ndata",
        );

        match handle_post_upload(&request, dir.path().to_str().unwrap()) {
            UploadOutcome::Stored { filename, size } => {
                assert!(filename.starts_with("upload_"));
                assert!(filename.ends_with(".bin"));
                assert_eq!(size, 4);
                let stored = std::fs::read(dir.path().join(&filename)).unwrap();
                assert_eq!(stored, b"data");
            }
            other => panic!("expected stored, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let request =
            request_from(b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(
            handle_post_upload(&request, dir.path().to_str().unwrap()),
            UploadOutcome::Failed(400)
        );
    }

    #[test]
    fn multipart_without_boundary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let raw = b"POST /upload HTTP/1.1\r\nHost: x\r\n\
            Content-Type: multipart/form-data\r\nContent-Length: 4\r\n\r\nbody";
        let request = request_from(raw);
        assert_eq!(
            handle_post_upload(&request, dir.path().to_str().unwrap()),
            UploadOutcome::Failed(400)
        );
    }

    #[test]
    fn unwritable_target_is_a_server_error() {
        let request = request_from(
            b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\ndata",
        );
        assert_eq!(
            handle_post_upload(&request, "/no/such/upload/dir"),
            UploadOutcome::Failed(500)
        );
    }

    #[test]
    fn delete_removes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "x").unwrap();

        match handle_delete("/uploads/old.txt", dir.path().to_str().unwrap()) {
            DeleteOutcome::Deleted { filename } => assert_eq!(filename, "old.txt"),
            other => panic!("expected deleted, got {other:?}"),
        }
        assert!(!dir.path().join("old.txt").exists());
    }

    #[test]
    fn delete_decodes_percent_escapes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my file.txt"), "x").unwrap();

        match handle_delete("/uploads/my%20file.txt", dir.path().to_str().unwrap()) {
            DeleteOutcome::Deleted { filename } => assert_eq!(filename, "my file.txt"),
            other => panic!("expected deleted, got {other:?}"),
        }
    }

    #[test]
    fn delete_refuses_traversal_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let upload = dir.path().to_str().unwrap();

        assert_eq!(handle_delete("/uploads/", upload), DeleteOutcome::Failed(400));
        assert_eq!(
            handle_delete("/uploads/%2e%2esecret", upload),
            DeleteOutcome::Failed(400)
        );
        assert_eq!(
            handle_delete("/uploads/a%2fb", upload),
            DeleteOutcome::Failed(400)
        );
        assert_eq!(
            handle_delete("/uploads/subdir", upload),
            DeleteOutcome::Failed(400)
        );
        assert_eq!(
            handle_delete("/uploads/ghost.txt", upload),
            DeleteOutcome::Failed(404)
        );
    }

    #[test]
    fn put_saves_body_under_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_from(
            b"PUT /uploads HTTP/1.1\r\nHost: x\r\nContent-Length: 7\r\n\r\npayload",
        );

        match handle_put(&request, dir.path().to_str().unwrap()) {
            PutOutcome::Saved { path } => {
                assert!(path.contains("uploaded_file_"));
                assert_eq!(std::fs::read(&path).unwrap(), b"payload");
            }
            other => panic!("expected saved, got {other:?}"),
        }
    }

    #[test]
    fn put_into_missing_directory_fails() {
        let request =
            request_from(b"PUT /uploads HTTP/1.1\r\nHost: x\r\nContent-Length: 1\r\n\r\nx");
        assert_eq!(
            handle_put(&request, "/no/such/dir"),
            PutOutcome::Failed(500)
        );
    }
}
