use std::fs;
use std::path::Path;

use crate::config::Location;
use crate::mime::mime_type;
use crate::path::{join_root_and_uri, uri_extension};

/// What a GET/HEAD against the filesystem resolved to. The router maps each
/// variant onto a response; nothing here touches response construction.
#[derive(Debug, PartialEq, Eq)]
pub enum StaticOutcome {
    File {
        body: Vec<u8>,
        mime: &'static str,
    },
    Listing {
        html: String,
    },
    CgiScript {
        script: String,
        interpreter: String,
    },
    NotFound,
    Forbidden,
}

pub fn resolve(location: &Location, uri: &str) -> StaticOutcome {
    let full_path = join_root_and_uri(&location.root, uri);

    let metadata = match fs::metadata(&full_path) {
        Ok(metadata) => metadata,
        Err(_) => return StaticOutcome::NotFound,
    };

    if metadata.is_dir() {
        return resolve_directory(location, uri, &full_path);
    }

    if let Some(extension) = uri_extension(uri) {
        if let Some(interpreter) = location.interpreter_for(extension) {
            return StaticOutcome::CgiScript {
                script: full_path,
                interpreter: interpreter.to_string(),
            };
        }
    }

    match fs::read(&full_path) {
        Ok(body) => StaticOutcome::File {
            body,
            mime: mime_type(uri),
        },
        Err(_) => StaticOutcome::Forbidden,
    }
}

fn resolve_directory(location: &Location, uri: &str, dir_path: &str) -> StaticOutcome {
    for index_file in &location.index_files {
        let candidate = format!("{}/{}", dir_path.trim_end_matches('/'), index_file);
        if Path::new(&candidate).exists() {
            return match fs::read(&candidate) {
                Ok(body) => StaticOutcome::File {
                    body,
                    mime: mime_type(index_file),
                },
                Err(_) => StaticOutcome::Forbidden,
            };
        }
    }

    if location.autoindex {
        return StaticOutcome::Listing {
            html: directory_listing(uri, dir_path),
        };
    }

    StaticOutcome::Forbidden
}

/// Plain HTML listing of the directory, entries linked relative to the
/// request URI. Names are sorted so output is stable.
fn directory_listing(uri: &str, dir_path: &str) -> String {
    let mut names: Vec<String> = fs::read_dir(dir_path)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();

    let mut html = format!(
        "<html><head><title>Directory listing for {uri}</title></head><body>\
         <h1>Directory listing for {uri}</h1><hr><ul>"
    );
    let base = if uri.ends_with('/') {
        uri.to_string()
    } else {
        format!("{uri}/")
    };
    for name in names {
        html.push_str(&format!("<li><a href=\"{base}{name}\">{name}</a></li>"));
    }
    html.push_str("</ul><hr></body></html>");
    html
}
