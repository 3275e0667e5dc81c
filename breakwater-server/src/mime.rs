/// MIME type from a filename's extension. Files without an extension are
/// served as plain text; unknown extensions fall back to octet-stream.
pub fn mime_type(path: &str) -> &'static str {
    let extension = match path.rfind('.') {
        Some(dot) => path[dot..].to_ascii_lowercase(),
        None => return "text/plain",
    };

    match extension.as_str() {
        ".html" | ".htm" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        ".ico" => "image/x-icon",
        ".txt" => "text/plain",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_extensions() {
        assert_eq!(mime_type("index.html"), "text/html");
        assert_eq!(mime_type("a/b/page.HTM"), "text/html");
        assert_eq!(mime_type("style.css"), "text/css");
        assert_eq!(mime_type("app.js"), "application/javascript");
        assert_eq!(mime_type("logo.png"), "image/png");
        assert_eq!(mime_type("photo.JPEG"), "image/jpeg");
        assert_eq!(mime_type("data.json"), "application/json");
    }

    #[test]
    fn unknown_and_missing_extensions() {
        assert_eq!(mime_type("archive.tar.zst"), "application/octet-stream");
        assert_eq!(mime_type("README"), "text/plain");
    }
}
