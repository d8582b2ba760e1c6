/// Wraps `value` in single quotes, turning each embedded `'` into the
/// close-quote, escaped-quote, reopen-quote sequence. Safe for arbitrary
/// payload bytes that are valid UTF-8.
pub fn shell_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

/// Joins argv parts into one shell line with every part escaped.
pub fn shell_join<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|part| shell_escape(part.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_wrapped_in_single_quotes() {
        assert_eq!(shell_escape("abc"), "'abc'");
        assert_eq!(shell_escape(""), "''");
        assert_eq!(shell_escape("/tmp/work dir/file.txt"), "'/tmp/work dir/file.txt'");
    }

    #[test]
    fn embedded_single_quotes_use_the_break_out_sequence() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
        assert_eq!(shell_escape("'"), "''\\'''");
    }

    #[test]
    fn metacharacters_are_inert_inside_the_quotes() {
        let escaped = shell_escape("$(rm -rf /); `date`; $HOME && echo *");
        assert_eq!(escaped, "'$(rm -rf /); `date`; $HOME && echo *'");
    }

    #[test]
    fn join_escapes_every_part() {
        let line = shell_join(&["echo", "a b", "c'd"]);
        assert_eq!(line, "'echo' 'a b' 'c'\\''d'");
    }
}
