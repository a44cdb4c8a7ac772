//! # Command Tokenizer
//!
//! Splits a substituted command line into the executable and its arguments.
//! Quoting follows a small subset of POSIX shell rules; nothing is ever expanded.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    /// Backslash seen outside quotes.
    Escaped,
    /// Backslash seen inside double quotes.
    DoubleEscaped,
}

/// Tokenize `input`.
///
/// - Unquoted whitespace separates tokens.
/// - `'...'` is fully literal; `"..."` honours `\"` and `\\` only.
/// - `''` and `""` produce an empty token.
/// - A trailing backslash is kept as a literal `\`.
/// - An unterminated quote runs to the end of the input.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Tracks whether `current` is a token even when empty (`""`)
    let mut in_token = false;
    let mut state = State::Normal;

    for c in input.chars() {
        match state {
            State::Normal => match c {
                '\'' => {
                    state = State::SingleQuoted;
                    in_token = true;
                }
                '"' => {
                    state = State::DoubleQuoted;
                    in_token = true;
                }
                '\\' => {
                    state = State::Escaped;
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
            State::SingleQuoted => match c {
                '\'' => state = State::Normal,
                c => current.push(c),
            },
            State::DoubleQuoted => match c {
                '"' => state = State::Normal,
                '\\' => state = State::DoubleEscaped,
                c => current.push(c),
            },
            State::Escaped => {
                current.push(c);
                state = State::Normal;
            }
            State::DoubleEscaped => {
                if c != '"' && c != '\\' {
                    current.push('\\');
                }
                current.push(c);
                state = State::DoubleQuoted;
            }
        }
    }

    match state {
        State::Escaped | State::DoubleEscaped => current.push('\\'),
        _ => {}
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_split() {
        assert_eq!(tokenize("echo hello  world"), vec!["echo", "hello", "world"]);
        assert_eq!(tokenize("  ls\t-la \n"), vec!["ls", "-la"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_quoted_segments_stay_whole() {
        assert_eq!(
            tokenize(r#"./deploy.sh "my app" 'prod env'"#),
            vec!["./deploy.sh", "my app", "prod env"]
        );
    }

    #[test]
    fn test_nested_quotes_are_literal() {
        assert_eq!(tokenize(r#"echo "it's fine""#), vec!["echo", "it's fine"]);
        assert_eq!(tokenize(r#"echo 'say "hi"'"#), vec!["echo", r#"say "hi""#]);
    }

    #[test]
    fn test_empty_quoted_tokens() {
        assert_eq!(tokenize(r#"cmd "" ''"#), vec!["cmd", "", ""]);
    }

    #[test]
    fn test_adjacent_segments_join() {
        assert_eq!(tokenize(r#"a"b c"d"#), vec!["ab cd"]);
        assert_eq!(tokenize(r#"--name='x y'"#), vec!["--name=x y"]);
    }

    #[test]
    fn test_escapes() {
        assert_eq!(tokenize(r"echo a\ b"), vec!["echo", "a b"]);
        assert_eq!(tokenize(r#"echo "a \"q\" \\ \n""#), vec!["echo", r#"a "q" \ \n"#]);
        assert_eq!(tokenize(r"echo 'a\b'"), vec!["echo", r"a\b"]);
    }

    #[test]
    fn test_trailing_backslash_is_literal() {
        assert_eq!(tokenize(r"echo foo\"), vec!["echo", r"foo\"]);
        assert_eq!(tokenize(r"echo \"), vec!["echo", r"\"]);
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        assert_eq!(tokenize(r#"echo "hello world"#), vec!["echo", "hello world"]);
        assert_eq!(tokenize("echo 'abc"), vec!["echo", "abc"]);
    }
}
