use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::warn;

use breakwater_http::Request;

#[derive(Debug, Error)]
pub enum CgiError {
    #[error("failed to launch CGI interpreter: {0}")]
    Launch(std::io::Error),
    #[error("failed to talk to CGI child: {0}")]
    Io(std::io::Error),
    #[error("CGI script exited with status {0}")]
    Exit(i32),
}

/// Run `interpreter script` with the request body on stdin and collect the
/// script's stdout. The child sees only the CGI variables plus a fixed PATH.
///
/// Synchronous by design: the event loop waits for the child. Registering
/// the stdout pipe with the poll is the known follow-up.
pub fn execute(script: &str, interpreter: &str, request: &Request) -> Result<Vec<u8>, CgiError> {
    let mut child = Command::new(interpreter)
        .arg(script)
        .env_clear()
        .env("REQUEST_METHOD", &request.method)
        .env("CONTENT_TYPE", request.header("content-type").unwrap_or(""))
        .env("CONTENT_LENGTH", request.header("content-length").unwrap_or(""))
        .env("SCRIPT_NAME", script)
        .env("PATH_INFO", script)
        .env("QUERY_STRING", "")
        .env("SERVER_PROTOCOL", "HTTP/1.1")
        .env("GATEWAY_INTERFACE", "CGI/1.1")
        .env("SERVER_NAME", "localhost")
        .env("SERVER_PORT", "8080")
        .env("PATH", "/usr/bin:/bin")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| {
            warn!(interpreter, script, "CGI spawn failed: {err}");
            CgiError::Launch(err)
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        if !request.body.is_empty() {
            stdin.write_all(&request.body).map_err(CgiError::Io)?;
        }
        // Dropping the handle closes the pipe and signals end of input.
    }

    let output = child.wait_with_output().map_err(CgiError::Io)?;
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        warn!(interpreter, script, code, "CGI script failed");
        return Err(CgiError::Exit(code));
    }

    Ok(output.stdout)
}

/// CGI output is headers, a blank line, then the body. Split at the first
/// `\r\n\r\n` (or `\n\n`); without a blank line the whole output is body.
/// Script-supplied headers are dropped; the server states its own.
pub fn response_body(output: &[u8]) -> &[u8] {
    if let Some(index) = find(output, b"\r\n\r\n") {
        return &output[index + 4..];
    }
    if let Some(index) = find(output, b"\n\n") {
        return &output[index + 2..];
    }
    output
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
