use tracing::debug;

use breakwater_http::{Request, Response};

use crate::cgi;
use crate::config::{Location, ServerConfig};
use crate::error_pages::error_response;
use crate::handlers::static_files::{self, StaticOutcome};
use crate::handlers::uploads::{self, DeleteOutcome, PutOutcome, UploadOutcome};
use crate::path::{join_root_and_uri, sanitize_uri, uri_extension};

/// Produce exactly one response for a complete, syntactically valid request.
pub fn handle_request(request: &Request, config: &ServerConfig) -> Response {
    let uri = match sanitize_uri(&request.uri) {
        Some(uri) => uri,
        None => return error_response(400, config),
    };

    let location = match find_location(&config.locations, uri) {
        Some(location) => location,
        None => return error_response(404, config),
    };

    if location.has_redirect() {
        let (status, url) = parse_redirect(&location.redirect);
        debug!(uri, status, url, "redirecting");
        return Response::redirect(status, url);
    }

    if !method_allowed(&request.method, &location.methods) {
        let mut response = error_response(405, config);
        let allow = Response::method_not_allowed(&location.methods);
        if let Some(value) = allow.header("Allow") {
            response.set_header("Allow", value.to_string());
        }
        return response;
    }

    if let Some(declared) = request.content_length() {
        if declared > config.max_body_size {
            return error_response(413, config);
        }
    }

    match request.method.as_str() {
        "GET" | "HEAD" => {
            let mut response = serve_static(request, location, uri, config);
            if request.method == "HEAD" {
                response.suppress_body();
            }
            response
        }
        "POST" => serve_post(request, location, uri, config),
        "DELETE" => serve_delete(location, uri, config),
        "PUT" => serve_put(request, location, config),
        _ => error_response(500, config),
    }
}

/// Longest matching prefix wins. `/` matches everything but only as the
/// fallback of last resort; other prefixes must end on a segment boundary.
pub fn find_location<'a>(locations: &'a [Location], uri: &str) -> Option<&'a Location> {
    let mut best: Option<&Location> = None;
    let mut best_length = 0;

    for location in locations {
        let prefix = &location.path;
        let matches = if prefix == "/" {
            true
        } else {
            uri.starts_with(prefix.as_str())
                && (uri.len() == prefix.len() || uri.as_bytes()[prefix.len()] == b'/')
        };
        if matches && prefix.len() > best_length {
            best = Some(location);
            best_length = prefix.len();
        }
    }

    best
}

/// `"<3xx-code> <url>"` or a bare URL defaulting to 301.
fn parse_redirect(redirect: &str) -> (u16, &str) {
    if let Some((first, rest)) = redirect.split_once(' ') {
        if first.len() == 3 && first.starts_with('3') {
            if let Ok(status) = first.parse::<u16>() {
                return (status, rest);
            }
        }
    }
    (301, redirect)
}

fn method_allowed(method: &str, allowed: &[String]) -> bool {
    if allowed.iter().any(|entry| entry == method) {
        return true;
    }
    // HEAD rides on GET.
    method == "HEAD" && allowed.iter().any(|entry| entry == "GET")
}

fn serve_static(
    request: &Request,
    location: &Location,
    uri: &str,
    config: &ServerConfig,
) -> Response {
    match static_files::resolve(location, uri) {
        StaticOutcome::File { body, mime } => Response::ok(body, mime),
        StaticOutcome::Listing { html } => Response::ok(html, "text/html"),
        StaticOutcome::CgiScript {
            script,
            interpreter,
        } => run_cgi(&script, &interpreter, request, config),
        StaticOutcome::NotFound => error_response(404, config),
        StaticOutcome::Forbidden => error_response(403, config),
    }
}

fn serve_post(
    request: &Request,
    location: &Location,
    uri: &str,
    config: &ServerConfig,
) -> Response {
    if let Some(extension) = uri_extension(uri) {
        if let Some(interpreter) = location.interpreter_for(extension) {
            let script = join_root_and_uri(&location.root, uri);
            if !std::path::Path::new(&script).exists() {
                return error_response(404, config);
            }
            return run_cgi(&script, interpreter, request, config);
        }
    }

    if location.has_upload_path() {
        return match uploads::handle_post_upload(request, &location.upload_path) {
            UploadOutcome::Stored { filename, size } => {
                let body = format!(
                    "<!DOCTYPE html><html><head><title>Upload Success</title></head><body>\
                     <h1>File Upload Successful</h1>\
                     <p>File saved as: {filename}</p>\
                     <p>Size: {size} bytes</p>\
                     </body></html>"
                );
                Response::ok(body, "text/html")
            }
            UploadOutcome::Failed(status) => error_response(status, config),
        };
    }

    let body = format!(
        "POST request received\nURI: {uri}\nBody: {}",
        String::from_utf8_lossy(&request.body)
    );
    Response::ok(body, "text/plain")
}

fn serve_delete(location: &Location, uri: &str, config: &ServerConfig) -> Response {
    if !location.has_upload_path() {
        return error_response(400, config);
    }

    match uploads::handle_delete(uri, &location.upload_path) {
        DeleteOutcome::Deleted { filename } => Response::ok(
            format!("File deleted successfully: {filename}"),
            "text/plain",
        ),
        DeleteOutcome::Failed(status) => error_response(status, config),
    }
}

fn serve_put(request: &Request, location: &Location, config: &ServerConfig) -> Response {
    if !location.has_upload_path() {
        return error_response(500, config);
    }

    match uploads::handle_put(request, &location.upload_path) {
        PutOutcome::Saved { path } => Response::ok(
            format!("PUT request successful\nFile saved to: {path}"),
            "text/plain",
        ),
        PutOutcome::Failed(status) => error_response(status, config),
    }
}

fn run_cgi(
    script: &str,
    interpreter: &str,
    request: &Request,
    config: &ServerConfig,
) -> Response {
    match cgi::execute(script, interpreter, request) {
        Ok(output) => {
            let mut response = Response::new(200);
            response.set_content_type("text/html");
            response.set_body(cgi::response_body(&output).to_vec());
            response
        }
        Err(_) => error_response(500, config),
    }
}
