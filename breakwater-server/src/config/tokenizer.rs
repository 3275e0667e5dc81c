/// Break configuration text into tokens: whitespace-separated words, the
/// singleton tokens `{`, `}` and `;`, `#` line comments, and double-quoted
/// strings that group a single token.
pub fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            if c == '"' {
                in_string = false;
                tokens.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                flush(&mut tokens, &mut current);
                in_string = true;
            }
            '#' => {
                flush(&mut tokens, &mut current);
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | ';' => {
                flush(&mut tokens, &mut current);
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => flush(&mut tokens, &mut current),
            c => current.push(c),
        }
    }

    flush(&mut tokens, &mut current);
    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}
