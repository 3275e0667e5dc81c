use std::path::Path;

use thiserror::Error;

use super::tokenizer::tokenize;
use super::{Location, ServerConfig};

const DIRECTIVE_KEYWORDS: &[&str] = &[
    "root",
    "autoindex",
    "index",
    "methods",
    "allow_methods",
    "upload_path",
    "cgi_extension",
    "cgi_extensions",
    "return",
    "listen",
    "server_name",
    "error_page",
    "client_max_body_size",
    "location",
];

const ALLOWED_CGI_EXTENSIONS: &[&str] = &[".py", ".php"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {0}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("configuration error: {0}")]
    Invalid(String),
}

pub fn parse_config_file(path: &Path) -> Result<Vec<ServerConfig>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Read(path.display().to_string(), err))?;
    parse_config(&content)
}

/// Parse nginx-style configuration text into server blocks. Any error
/// poisons the whole file; there are no partially accepted configurations.
pub fn parse_config(content: &str) -> Result<Vec<ServerConfig>, ConfigError> {
    let mut parser = Parser {
        tokens: tokenize(content),
        pos: 0,
    };

    let mut servers = Vec::new();
    while let Some(token) = parser.next() {
        if token == "server" {
            servers.push(parser.server_block()?);
        } else {
            return Err(invalid(format!("unknown top-level directive '{token}'")));
        }
    }
    Ok(servers)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &str) -> Result<(), ConfigError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!("expected '{expected}' but found '{token}'"))),
            None => Err(invalid(format!(
                "expected '{expected}' but reached end of file"
            ))),
        }
    }

    /// Consume a directive terminator, refusing `;;` runs.
    fn semicolon(&mut self, directive: &str) -> Result<(), ConfigError> {
        match self.next() {
            Some(token) if token == ";" => {}
            Some(token) => {
                return Err(invalid(format!(
                    "expected ';' after '{directive}' but found '{token}'"
                )))
            }
            None => {
                return Err(invalid(format!(
                    "expected ';' after '{directive}' but reached end of file"
                )))
            }
        }
        if self.peek() == Some(";") {
            return Err(invalid("multiple consecutive semicolons".to_string()));
        }
        Ok(())
    }

    /// One value token; directive keywords are refused in value position.
    fn value(&mut self, directive: &str) -> Result<String, ConfigError> {
        match self.next() {
            Some(token) if token == ";" || token == "{" || token == "}" => Err(invalid(format!(
                "expected value after '{directive}' but found '{token}'"
            ))),
            Some(token) if DIRECTIVE_KEYWORDS.contains(&token.as_str()) => Err(invalid(format!(
                "expected value after '{directive}' but found directive '{token}'"
            ))),
            Some(token) => Ok(token),
            None => Err(invalid(format!(
                "expected value after '{directive}' but reached end of file"
            ))),
        }
    }

    /// Value tokens up to the terminating semicolon.
    fn value_list(&mut self, directive: &str) -> Result<Vec<String>, ConfigError> {
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(";") => break,
                Some("}") | None => {
                    return Err(invalid(format!("expected ';' after '{directive}'")))
                }
                Some(token) if DIRECTIVE_KEYWORDS.contains(&token) => {
                    return Err(invalid(format!(
                        "expected ';' after '{directive}' but found directive '{token}'"
                    )))
                }
                Some(_) => values.push(self.next().unwrap_or_default()),
            }
        }
        self.semicolon(directive)?;
        Ok(values)
    }

    fn server_block(&mut self) -> Result<ServerConfig, ConfigError> {
        self.expect("{")?;
        let mut config = ServerConfig::default();

        loop {
            let directive = match self.next() {
                Some(token) if token == "}" => break,
                Some(token) => token,
                None => return Err(invalid("expected '}' at end of server block".to_string())),
            };

            match directive.as_str() {
                "listen" => {
                    let value = self.value("listen")?;
                    let (host, port) = parse_listen(&value)?;
                    config.host = host;
                    config.port = port;
                    self.semicolon("listen")?;
                }
                "server_name" => {
                    config.server_names = self.value_list("server_name")?;
                }
                "error_page" => {
                    let code = self.value("error_page")?;
                    let code: u16 = code
                        .parse()
                        .map_err(|_| invalid(format!("invalid error_page status '{code}'")))?;
                    let page = self.value("error_page")?;
                    config.error_pages.insert(code, page);
                    self.semicolon("error_page")?;
                }
                "client_max_body_size" => {
                    let value = self.value("client_max_body_size")?;
                    config.max_body_size = parse_body_size(&value)?;
                    self.semicolon("client_max_body_size")?;
                }
                "location" => {
                    config.locations.push(self.location_block()?);
                }
                other => {
                    return Err(invalid(format!(
                        "unknown directive '{other}' in server block"
                    )))
                }
            }
        }

        Ok(config)
    }

    fn location_block(&mut self) -> Result<Location, ConfigError> {
        let mut location = Location::default();
        location.path = self.value("location")?;
        if !location.path.starts_with('/') {
            return Err(invalid(format!(
                "location path '{}' must start with '/'",
                location.path
            )));
        }
        self.expect("{")?;

        loop {
            let directive = match self.next() {
                Some(token) if token == "}" => break,
                Some(token) => token,
                None => return Err(invalid("expected '}' at end of location block".to_string())),
            };

            match directive.as_str() {
                "allow_methods" | "methods" => {
                    let methods = self.value_list(&directive)?;
                    for method in &methods {
                        if !matches!(method.as_str(), "GET" | "POST" | "DELETE") {
                            return Err(invalid(format!(
                                "invalid HTTP method '{method}'; valid methods are GET, POST, DELETE"
                            )));
                        }
                    }
                    location.methods = methods;
                }
                "root" => {
                    location.root = self.value("root")?;
                    self.semicolon("root")?;
                }
                "autoindex" => {
                    let value = self.value("autoindex")?;
                    location.autoindex = value == "on";
                    self.semicolon("autoindex")?;
                }
                "index" => {
                    location.index_files = self.value_list("index")?;
                }
                "upload_path" => {
                    location.upload_path = self.value("upload_path")?;
                    self.semicolon("upload_path")?;
                }
                "cgi_extension" | "cgi_extensions" => {
                    let tokens = self.value_list(&directive)?;
                    if tokens.len() % 2 != 0 {
                        return Err(invalid(
                            "cgi_extension requires pairs of extension and interpreter path"
                                .to_string(),
                        ));
                    }
                    for pair in tokens.chunks(2) {
                        let extension = &pair[0];
                        let interpreter = &pair[1];
                        if !ALLOWED_CGI_EXTENSIONS.contains(&extension.as_str()) {
                            return Err(invalid(format!(
                                "unsupported CGI extension '{extension}'; only .py and .php are supported"
                            )));
                        }
                        if !interpreter.starts_with('/') {
                            return Err(invalid(format!(
                                "CGI interpreter '{interpreter}' must be an absolute path"
                            )));
                        }
                        location
                            .cgi_extensions
                            .insert(extension.clone(), interpreter.clone());
                    }
                }
                "return" => {
                    let first = self.value("return")?;
                    location.redirect = if is_redirect_status(&first) {
                        let url = self.value("return")?;
                        format!("{first} {url}")
                    } else {
                        first
                    };
                    self.semicolon("return")?;
                }
                other => {
                    return Err(invalid(format!(
                        "unknown directive '{other}' in location block"
                    )))
                }
            }
        }

        Ok(location)
    }
}

fn is_redirect_status(token: &str) -> bool {
    token.len() == 3 && token.starts_with('3') && token.bytes().all(|byte| byte.is_ascii_digit())
}

fn parse_listen(value: &str) -> Result<(String, u16), ConfigError> {
    let (host, port_str) = match value.rfind(':') {
        Some(colon) => (&value[..colon], &value[colon + 1..]),
        None => ("", value),
    };
    let port: u16 = port_str
        .parse()
        .map_err(|_| invalid(format!("invalid listen port '{port_str}'")))?;
    Ok((host.to_string(), port))
}

/// Sizes accept the suffixes k/K, m/M, g/G (powers of 1024).
fn parse_body_size(value: &str) -> Result<usize, ConfigError> {
    let (digits, multiplier) = match value.chars().last() {
        Some('k') | Some('K') => (&value[..value.len() - 1], 1024),
        Some('m') | Some('M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let base: usize = digits
        .parse()
        .map_err(|_| invalid(format!("invalid client_max_body_size '{value}'")))?;
    Ok(base * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        server {
            listen 127.0.0.1:8080;
            server_name example local;
            error_page 404 ./www/404.html;
            client_max_body_size 2m;
            location / {
                allow_methods GET POST;
                root ./www;
                index index.html index.htm;
                autoindex on;
            }
            location /cgi {
                allow_methods GET POST;
                root ./cgi;
                cgi_extension .py /usr/bin/python3 .php /usr/bin/php;
            }
            location /old {
                return 302 /new;
            }
        }
    "#;

    #[test]
    fn parses_full_server_block() {
        let servers = parse_config(SAMPLE).unwrap();
        assert_eq!(servers.len(), 1);

        let server = &servers[0];
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8080);
        assert_eq!(server.server_names, vec!["example", "local"]);
        assert_eq!(
            server.error_pages.get(&404).map(String::as_str),
            Some("./www/404.html")
        );
        assert_eq!(server.max_body_size, 2 * 1024 * 1024);
        assert_eq!(server.locations.len(), 3);

        let root = &server.locations[0];
        assert_eq!(root.path, "/");
        assert_eq!(root.methods, vec!["GET", "POST"]);
        assert_eq!(root.root, "./www");
        assert_eq!(root.index_files, vec!["index.html", "index.htm"]);
        assert!(root.autoindex);

        let cgi = &server.locations[1];
        assert_eq!(cgi.interpreter_for(".py"), Some("/usr/bin/python3"));
        assert_eq!(cgi.interpreter_for(".php"), Some("/usr/bin/php"));

        assert_eq!(server.locations[2].redirect, "302 /new");
    }

    #[test]
    fn bare_port_listen_means_wildcard_host() {
        let servers = parse_config("server { listen 9090; }").unwrap();
        assert_eq!(servers[0].host, "");
        assert_eq!(servers[0].port, 9090);
    }

    #[test]
    fn body_size_suffixes() {
        assert_eq!(parse_body_size("512").unwrap(), 512);
        assert_eq!(parse_body_size("4k").unwrap(), 4096);
        assert_eq!(parse_body_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_body_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_body_size("lots").is_err());
    }

    #[test]
    fn redirect_without_status_keeps_bare_url() {
        let servers =
            parse_config("server { listen 80; location /a { return /b; } }").unwrap();
        assert_eq!(servers[0].locations[0].redirect, "/b");
    }

    #[test]
    fn rejects_unknown_directives() {
        assert!(parse_config("server { listen 80; proxy_pass http://x; }").is_err());
        assert!(parse_config("upstream x {}").is_err());
        assert!(parse_config("server { location / { sendfile on; } }").is_err());
    }

    #[test]
    fn rejects_invalid_methods() {
        let result = parse_config("server { location / { allow_methods GET TRACE; } }");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_semicolon() {
        assert!(parse_config("server { listen 80 }").is_err());
        assert!(parse_config("server { location / { root ./www } }").is_err());
    }

    #[test]
    fn rejects_consecutive_semicolons() {
        assert!(parse_config("server { listen 80;; }").is_err());
    }

    #[test]
    fn rejects_bad_cgi_pairs() {
        assert!(parse_config("server { location / { cgi_extension .py; } }").is_err());
        assert!(
            parse_config("server { location / { cgi_extension .sh /bin/sh; } }").is_err()
        );
        assert!(
            parse_config("server { location / { cgi_extension .py python3; } }").is_err()
        );
    }

    #[test]
    fn rejects_relative_location_path() {
        assert!(parse_config("server { location www { root ./www; } }").is_err());
    }

    #[test]
    fn comments_are_ignored() {
        let servers = parse_config("# header\nserver { listen 80; # inline\n }").unwrap();
        assert_eq!(servers[0].port, 80);
    }
}
