use std::collections::BTreeMap;

pub fn status_message(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// An outgoing response under construction. Headers are kept ordered by name
/// so serialization is deterministic. Setting the body always refreshes
/// `Content-Length`; for HEAD the body is suppressed on the wire while the
/// header keeps the real size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status_code: u16,
    version: &'static str,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    suppress_body: bool,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            version: "HTTP/1.1",
            headers: BTreeMap::new(),
            body: Vec::new(),
            suppress_body: false,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status(&mut self, status_code: u16) {
        self.status_code = status_code;
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_string(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
        let length = self.body.len().to_string();
        self.set_header("Content-Length", length);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header("Content-Type", content_type);
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.set_header("Connection", value);
    }

    pub fn is_close(&self) -> bool {
        self.header("Connection") == Some("close")
    }

    /// HEAD semantics: the status line and headers go out unchanged, the
    /// body stays home.
    pub fn suppress_body(&mut self) {
        self.suppress_body = true;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(128 + self.body.len());
        wire.extend_from_slice(self.version.as_bytes());
        wire.push(b' ');
        wire.extend_from_slice(self.status_code.to_string().as_bytes());
        wire.push(b' ');
        wire.extend_from_slice(status_message(self.status_code).as_bytes());
        wire.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            wire.extend_from_slice(name.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(value.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }
        wire.extend_from_slice(b"\r\n");
        if !self.suppress_body {
            wire.extend_from_slice(&self.body);
        }
        wire
    }

    pub fn ok(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        let mut response = Response::new(200);
        response.set_content_type(content_type);
        response.set_body(body);
        response
    }

    pub fn redirect(status_code: u16, url: &str) -> Self {
        let mut response = Response::new(status_code);
        response.set_header("Location", url);
        response.set_content_type("text/html");
        response.set_body(format!(
            "<html><body><h1>{} {}</h1><p>Moved to <a href=\"{url}\">{url}</a></p></body></html>",
            status_code,
            status_message(status_code)
        ));
        response
    }

    pub fn bad_request() -> Self {
        Self::error(400, "The request was malformed.")
    }

    pub fn not_found() -> Self {
        Self::error(404, "The requested resource was not found.")
    }

    pub fn forbidden() -> Self {
        Self::error(403, "Access to the requested resource is forbidden.")
    }

    pub fn request_timeout() -> Self {
        Self::error(408, "The request timed out.")
    }

    pub fn length_required() -> Self {
        Self::error(411, "Content-Length header is required for this request.")
    }

    pub fn payload_too_large() -> Self {
        Self::error(413, "The request body exceeds the configured limit.")
    }

    pub fn server_error() -> Self {
        Self::error(500, "The server encountered an internal error.")
    }

    /// 405 carries the location's permitted methods; HEAD rides along
    /// whenever GET is permitted.
    pub fn method_not_allowed(allowed: &[String]) -> Self {
        let mut methods: Vec<String> = allowed.to_vec();
        if allowed.iter().any(|method| method == "GET") {
            methods.push("HEAD".to_string());
        }
        let mut response = Self::error(405, "The requested method is not allowed.");
        response.set_header("Allow", methods.join(", "));
        response
    }

    pub fn error(status_code: u16, detail: &str) -> Self {
        let mut response = Response::new(status_code);
        response.set_content_type("text/html");
        response.set_keep_alive(false);
        response.set_body(format!(
            "<html><body><h1>{} {}</h1><p>{}</p></body></html>",
            status_code,
            status_message(status_code),
            detail
        ));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_covers_known_codes() {
        assert_eq!(status_message(200), "OK");
        assert_eq!(status_message(301), "Moved Permanently");
        assert_eq!(status_message(405), "Method Not Allowed");
        assert_eq!(status_message(413), "Payload Too Large");
        assert_eq!(status_message(502), "Bad Gateway");
        assert_eq!(status_message(418), "Unknown");
        assert_eq!(status_message(999), "Unknown");
    }

    #[test]
    fn serializes_status_line_headers_and_body() {
        let mut response = Response::ok("HI", "text/html");
        response.set_keep_alive(true);
        let wire = String::from_utf8(response.to_bytes()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Type: text/html\r\n"));
        assert!(wire.contains("Content-Length: 2\r\n"));
        assert!(wire.contains("Connection: keep-alive\r\n"));
        assert!(wire.ends_with("\r\n\r\nHI"));
    }

    #[test]
    fn headers_serialize_in_name_order() {
        let mut response = Response::new(200);
        response.set_header("Zeta", "1");
        response.set_header("Alpha", "2");
        response.set_body("x");
        let wire = String::from_utf8(response.to_bytes()).unwrap();
        let alpha = wire.find("Alpha").unwrap();
        let zeta = wire.find("Zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn set_body_refreshes_content_length() {
        let mut response = Response::new(200);
        response.set_body("four");
        assert_eq!(response.header("Content-Length"), Some("4"));
        response.set_body("longer body");
        assert_eq!(response.header("Content-Length"), Some("11"));
    }

    #[test]
    fn suppressed_body_keeps_content_length() {
        let mut response = Response::ok("payload", "text/plain");
        response.suppress_body();
        let wire = response.to_bytes();
        let text = String::from_utf8(wire.clone()).unwrap();
        assert!(text.contains("Content-Length: 7\r\n"));
        let terminator = twoway::find_bytes(&wire, b"\r\n\r\n").unwrap();
        assert_eq!(wire.len(), terminator + 4);
    }

    #[test]
    fn error_responses_close_the_connection() {
        for response in [
            Response::bad_request(),
            Response::not_found(),
            Response::forbidden(),
            Response::request_timeout(),
            Response::length_required(),
            Response::payload_too_large(),
            Response::server_error(),
        ] {
            assert!(response.is_close(), "status {}", response.status_code());
            assert_eq!(response.header("Content-Type"), Some("text/html"));
            assert!(!response.body().is_empty());
        }
    }

    #[test]
    fn method_not_allowed_lists_methods_with_head_for_get() {
        let allowed = vec!["GET".to_string()];
        let response = Response::method_not_allowed(&allowed);
        assert_eq!(response.status_code(), 405);
        assert_eq!(response.header("Allow"), Some("GET, HEAD"));

        let allowed = vec!["POST".to_string(), "DELETE".to_string()];
        let response = Response::method_not_allowed(&allowed);
        assert_eq!(response.header("Allow"), Some("POST, DELETE"));
    }

    #[test]
    fn redirect_sets_location_and_pointer_body() {
        let response = Response::redirect(301, "/new-home");
        assert_eq!(response.status_code(), 301);
        assert_eq!(response.header("Location"), Some("/new-home"));
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("/new-home"));

        let response = Response::redirect(302, "http://example.com/");
        assert_eq!(response.status_code(), 302);
        assert_eq!(response.header("Location"), Some("http://example.com/"));
    }
}
