//! Typographic punctuation that downstream consumers misparse as ASCII.

/// ASCII replacement for a confusable character, if it is one.
fn ascii_for(ch: char) -> Option<char> {
    match ch {
        '\u{201C}' | '\u{201D}' => Some('"'),  // “ ”
        '\u{2018}' | '\u{2019}' => Some('\''), // ‘ ’
        '\u{0384}' => Some('\''),              // greek tonos, rendered as a prime
        _ => None,
    }
}

/// Replace every confusable character in `s`; all other characters pass
/// through unchanged.
pub fn normalize(s: &str) -> String {
    s.chars().map(|ch| ascii_for(ch).unwrap_or(ch)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curly_quotes_become_ascii() {
        assert_eq!(normalize("\u{201C}hi\u{201D}"), "\"hi\"");
        assert_eq!(normalize("it\u{2019}s \u{2018}ok\u{2019}"), "it's 'ok'");
    }

    #[test]
    fn tonos_becomes_apostrophe() {
        assert_eq!(normalize("rock\u{0384}n roll"), "rock'n roll");
    }

    #[test]
    fn other_text_untouched() {
        let s = "plain \"ascii\" — em-dash, ünïcödé, 日本語";
        assert_eq!(normalize(s), s);
        assert_eq!(normalize(""), "");
    }
}
