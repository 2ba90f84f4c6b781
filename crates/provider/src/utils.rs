//! Config helpers.

/// Expand `${VAR}` patterns in a string with environment variable values.
///
/// Unknown variables are replaced with an empty string. An unterminated
/// `${` is kept verbatim.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }

        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }

        if !closed {
            result.push_str("${");
            result.push_str(&name);
        } else if let Ok(value) = std::env::var(&name) {
            result.push_str(&value);
        } else {
            tracing::warn!("environment variable '{name}' is not set");
        }
    }

    result
}
