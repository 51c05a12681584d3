//! `//tool:name key:value ...` directive comments

/// A parsed directive comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Full directive name including the tool prefix, e.g. `weft:span`.
    pub name: String,
    pub args: Vec<(String, String)>,
}

impl Directive {
    /// Parse a line comment. Directives have no space after `//` and a
    /// `tool:name` head; anything else is an ordinary comment.
    pub fn parse(comment: &str) -> Option<Self> {
        let body = comment.strip_prefix("//")?;
        let body = body.trim_end_matches(['\r', '\n']);
        let head_end = body.find(char::is_whitespace).unwrap_or(body.len());
        let head = &body[..head_end];

        let (tool, name) = head.split_once(':')?;
        if !is_word(tool) || !is_word(name) {
            return None;
        }

        let args = split_args(&body[head_end..])
            .into_iter()
            .map(|arg| match arg.split_once(':') {
                Some((key, value)) => (key.to_string(), unquote(value)),
                None => (arg, String::new()),
            })
            .collect();

        Some(Self {
            name: head.to_string(),
            args,
        })
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Whitespace split that keeps double-quoted runs together.
fn split_args(s: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}
