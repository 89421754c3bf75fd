//! Request line framing
//!
//! A request is one `\n`-terminated UTF-8 line. Tokens are separated by
//! whitespace; a double-quoted run of text is a single token with the quotes
//! removed, so paths containing spaces can be sent as `"sample 1.wav"`.

use crate::error::{Error, Result};

/// Longest accepted request line, in bytes
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Decode one raw line (with or without its terminator) into tokens.
///
/// A blank line yields no tokens.
pub fn decode_line(raw: &[u8]) -> Result<Vec<String>> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if line.len() > MAX_LINE_LEN {
        return Err(Error::ProtocolParseError(format!(
            "request exceeds {} bytes",
            MAX_LINE_LEN
        )));
    }

    let line = std::str::from_utf8(line)
        .map_err(|_| Error::ProtocolParseError("request is not valid UTF-8".to_string()))?;

    tokenize(line)
}

/// Split a request line into tokens.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' if in_quotes => {
                push_token(&mut tokens, &mut current, true);
                in_quotes = false;
            }
            '"' => {
                push_token(&mut tokens, &mut current, false);
                in_quotes = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                push_token(&mut tokens, &mut current, false);
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::ProtocolParseError(
            "unterminated quoted string".to_string(),
        ));
    }
    push_token(&mut tokens, &mut current, false);

    Ok(tokens)
}

/// Move `current` into `tokens`. Quoted tokens are kept even when empty.
fn push_token(tokens: &mut Vec<String>, current: &mut String, quoted: bool) {
    let token = current.trim();
    if quoted || !token.is_empty() {
        tokens.push(token.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_tokens() {
        assert_eq!(
            tokenize("audio  seek\t30s").unwrap(),
            vec!["audio", "seek", "30s"]
        );
    }

    #[test]
    fn test_quoted_token_keeps_spaces() {
        assert_eq!(
            tokenize(r#"audio add "music/sample 1.wav" b.mp3"#).unwrap(),
            vec!["audio", "add", "music/sample 1.wav", "b.mp3"]
        );
    }

    #[test]
    fn test_quoted_token_is_trimmed() {
        assert_eq!(
            tokenize(r#"audio add " a.wav ""#).unwrap(),
            vec!["audio", "add", "a.wav"]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize(r#"audio add "a.wav"#).unwrap_err();
        assert!(matches!(err, Error::ProtocolParseError(_)));
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"ping\r\n").unwrap(), vec!["ping"]);
        assert_eq!(decode_line(b"ping\n").unwrap(), vec!["ping"]);
        assert!(decode_line(b"   \n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_line_rejects_bad_input() {
        assert!(matches!(
            decode_line(&[0xff, 0xfe, b'\n']),
            Err(Error::ProtocolParseError(_))
        ));

        let long = vec![b'a'; MAX_LINE_LEN + 1];
        assert!(matches!(
            decode_line(&long),
            Err(Error::ProtocolParseError(_))
        ));
    }
}
