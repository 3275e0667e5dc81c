use breakwater_http::Response;

use crate::config::ServerConfig;

/// Materialize an error status as a response, preferring the server's
/// configured error page over the built-in body. Error responses always
/// close the connection.
pub fn error_response(status: u16, config: &ServerConfig) -> Response {
    if let Some(page) = config.error_pages.get(&status) {
        if let Ok(content) = std::fs::read(page) {
            let mut response = Response::new(status);
            response.set_content_type("text/html");
            response.set_keep_alive(false);
            response.set_body(content);
            return response;
        }
    }

    match status {
        400 => Response::bad_request(),
        403 => Response::forbidden(),
        404 => Response::not_found(),
        408 => Response::request_timeout(),
        411 => Response::length_required(),
        413 => Response::payload_too_large(),
        500 => Response::server_error(),
        other => Response::error(other, "The request could not be served."),
    }
}
