use std::collections::HashMap;

use crate::types::{HttpVersion, ParseLimits, ParseOutcome, Request};

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

const RECOGNIZED_METHODS: &[&str] = &[
    "GET", "POST", "DELETE", "HEAD", "OPTIONS", "PUT", "PATCH", "TRACE", "CONNECT", "PROPFIND",
];

/// Methods whose non-empty body requires a declared `Content-Length`.
const LENGTH_REQUIRED_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

pub fn parse_request(buffer: &[u8]) -> ParseOutcome {
    parse_request_with_limits(buffer, &ParseLimits::default())
}

/// Parse one request out of an accumulated read buffer.
///
/// The buffer is never mutated; callers slice off `consumed` bytes after a
/// successful parse so pipelined follow-ups survive. Re-running the parse on
/// the same bytes yields the same outcome.
pub fn parse_request_with_limits(buffer: &[u8], limits: &ParseLimits) -> ParseOutcome {
    if buffer.is_empty() {
        return ParseOutcome::Incomplete;
    }

    let headers_end = twoway::find_bytes(buffer, HEADER_TERMINATOR);

    let header_region = match headers_end {
        Some(end) => &buffer[..end + HEADER_TERMINATOR.len()],
        None => buffer,
    };
    if has_bare_lf(header_region) {
        return invalid(400);
    }

    let headers_end = match headers_end {
        Some(end) => {
            if end > limits.max_header_bytes {
                return invalid(400);
            }
            end
        }
        None => {
            if buffer.len() > limits.max_header_bytes {
                return invalid(400);
            }
            return ParseOutcome::Incomplete;
        }
    };

    let line_end = match twoway::find_bytes(buffer, CRLF) {
        Some(end) => end,
        None => return ParseOutcome::Incomplete,
    };

    let (method, uri, version) = match parse_request_line(&buffer[..line_end]) {
        Some(parts) => parts,
        None => return invalid(400),
    };

    // With no headers at all the request line's CRLF is the start of the
    // terminator, leaving an empty header region.
    let header_start = line_end + CRLF.len();
    let header_region = if header_start >= headers_end {
        &[][..]
    } else {
        &buffer[header_start..headers_end]
    };
    let headers = match parse_headers(header_region) {
        Ok(headers) => headers,
        Err(status) => return invalid(status),
    };

    // HTTP/1.1 requires Host, with a compatibility concession for legacy
    // GET clients that declare a Content-Length.
    if version == HttpVersion::Http11 && !headers.contains_key("host") {
        let exempt = method == "GET" && headers.contains_key("content-length");
        if !exempt {
            return invalid(400);
        }
    }

    let body_start = headers_end + HEADER_TERMINATOR.len();
    let declared_length = headers.get("content-length").map(|value| {
        value
            .parse::<usize>()
            .unwrap_or(0) // validated digits-only in parse_headers
    });

    let (body, mut consumed) = match declared_length {
        Some(length) => {
            let available = buffer.len() - body_start;
            if available < length {
                return ParseOutcome::Incomplete;
            }
            (
                buffer[body_start..body_start + length].to_vec(),
                body_start + length,
            )
        }
        None => {
            let remainder = &buffer[body_start..];
            let has_meaningful_bytes = remainder.iter().any(|byte| !is_whitespace(*byte));
            if has_meaningful_bytes && LENGTH_REQUIRED_METHODS.contains(&method.as_str()) {
                return invalid(411);
            }
            (Vec::new(), body_start)
        }
    };

    // Trailing whitespace counts as consumed so the session buffer empties.
    if buffer[consumed..]
        .iter()
        .all(|byte| is_whitespace(*byte))
    {
        consumed = buffer.len();
    }

    ParseOutcome::Complete {
        request: Request {
            method,
            uri,
            version,
            headers,
            body,
        },
        consumed,
    }
}

fn invalid(status: u16) -> ParseOutcome {
    ParseOutcome::Invalid {
        status,
        consumed: 0,
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// A line feed not preceded by a carriage return anywhere in the request
/// line or headers is a hard 400. Body bytes are exempt.
fn has_bare_lf(region: &[u8]) -> bool {
    region.iter().enumerate().any(|(index, byte)| {
        *byte == b'\n' && (index == 0 || region[index - 1] != b'\r')
    })
}

fn parse_request_line(line: &[u8]) -> Option<(String, String, HttpVersion)> {
    if line.is_empty() || line[0] == b' ' {
        return None;
    }
    if line.iter().any(|byte| *byte < 0x20) {
        return None;
    }

    let text = std::str::from_utf8(line).ok()?;
    let text = text.trim_end_matches(' ');
    if text.contains("  ") {
        return None;
    }

    let mut parts = text.split(' ');
    let method = parts.next()?;
    let uri = parts.next()?;
    let version_raw = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    if !RECOGNIZED_METHODS.contains(&method) {
        return None;
    }
    let version = HttpVersion::parse(version_raw)?;

    if !uri.starts_with('/') {
        return None;
    }
    if uri.bytes().any(|byte| byte < 0x20 || byte == 0x7f) {
        return None;
    }

    Some((method.to_string(), uri.to_string(), version))
}

fn parse_headers(region: &[u8]) -> Result<HashMap<String, String>, u16> {
    let mut headers = HashMap::new();
    if region.is_empty() {
        return Ok(headers);
    }

    let text = std::str::from_utf8(region).map_err(|_| 400u16)?;
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }

        let colon = line.find(':').ok_or(400u16)?;
        let name = line[..colon].trim();
        if name.is_empty() {
            return Err(400);
        }
        let name = name.to_ascii_lowercase();
        let value = line[colon + 1..].trim().to_string();

        if name == "host" && headers.contains_key("host") {
            return Err(400);
        }
        if name == "content-length" {
            validate_content_length(&value)?;
        }

        headers.insert(name, value);
    }

    Ok(headers)
}

fn validate_content_length(value: &str) -> Result<(), u16> {
    if value.is_empty() || value.starts_with('-') {
        return Err(400);
    }
    if !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(400);
    }
    if value.len() > 10 {
        return Err(413);
    }
    Ok(())
}
