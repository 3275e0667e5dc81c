use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "HTTP/1.0" => Some(HttpVersion::Http10),
            "HTTP/1.1" => Some(HttpVersion::Http11),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

/// A fully parsed request. Header names are stored lowercased with a single
/// value per name; lookups through [`Request::header`] are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub version: HttpVersion,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// Declared `Content-Length`, if present and well formed. The parser has
    /// already rejected malformed values, so a plain parse suffices here.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`;
    /// HTTP/1.0 defaults to close unless `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let connection = self
            .header("connection")
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match self.version {
            HttpVersion::Http11 => connection != "close",
            HttpVersion::Http10 => connection == "keep-alive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Bytes allowed before the header terminator; overflow answers 400.
    pub max_header_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
        }
    }
}

/// Outcome of parsing an accumulated read buffer.
///
/// `consumed` is the offset past which unconsumed bytes belong to the next
/// pipelined request; trailing whitespace counts as consumed. An `Invalid`
/// outcome with `consumed == 0` means the whole buffer should be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Syntactically fine so far, but more bytes are required.
    Incomplete,
    Complete { request: Request, consumed: usize },
    /// Malformed request mapped to an HTTP status (400, 411 or 413).
    Invalid { status: u16, consumed: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_round_trip() {
        assert_eq!(HttpVersion::parse("HTTP/1.0"), Some(HttpVersion::Http10));
        assert_eq!(HttpVersion::parse("HTTP/1.1"), Some(HttpVersion::Http11));
        assert_eq!(HttpVersion::parse("HTTP/2.0"), None);
        assert_eq!(HttpVersion::parse("http/1.1"), None);
        assert_eq!(HttpVersion::Http11.as_str(), "HTTP/1.1");
    }

    fn request_with_header(name: &str, value: &str) -> Request {
        let mut headers = HashMap::new();
        headers.insert(name.to_string(), value.to_string());
        Request {
            method: "GET".to_string(),
            uri: "/".to_string(),
            version: HttpVersion::Http11,
            headers,
            body: Vec::new(),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = request_with_header("content-type", "text/plain");
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.header("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("content-length"), None);
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let mut request = request_with_header("host", "x");
        assert!(request.is_keep_alive());

        request.version = HttpVersion::Http10;
        assert!(!request.is_keep_alive());

        request
            .headers
            .insert("connection".to_string(), "keep-alive".to_string());
        assert!(request.is_keep_alive());

        request.version = HttpVersion::Http11;
        request
            .headers
            .insert("connection".to_string(), "close".to_string());
        assert!(!request.is_keep_alive());
    }

    #[test]
    fn keep_alive_header_value_case_insensitive() {
        let request = request_with_header("connection", "Close");
        assert!(!request.is_keep_alive());
    }
}
