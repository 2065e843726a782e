//! Regular expressions used by string predicates

use bson::{Bson, Regex};

use crate::expr::BinaryOp;

/// Regex value with its options in canonical (sorted) order
pub fn regex(pattern: impl Into<String>, options: &str) -> Bson {
    let mut flags: Vec<char> = options.chars().collect();
    flags.sort_unstable();
    flags.dedup();
    Bson::RegularExpression(Regex {
        pattern: pattern.into(),
        options: flags.into_iter().collect(),
    })
}

/// Escapes regex metacharacters and whitespace
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '*' | '+' | '?' | '|' | '{' | '[' | '(' | ')' | '^' | '$' | '.' | '#' => {
                out.push('\\');
                out.push(c);
            }
            ' ' => out.push_str("\\ "),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            _ => out.push(c),
        }
    }
    out
}

fn class_member(c: char) -> String {
    match c {
        '-' => "\\-".to_string(),
        ']' => "\\]".to_string(),
        other => escape(&other.to_string()),
    }
}

/// Members of a character class, unbracketed
fn class_body(chars: &[char]) -> String {
    chars.iter().map(|c| class_member(*c)).collect()
}

/// Class matching any of `chars`; a single character is left bare
pub fn positive_class(chars: &[char]) -> String {
    let body = class_body(chars);
    if chars.len() > 1 {
        format!("[{}]", body)
    } else {
        body
    }
}

pub fn negative_class(chars: &[char]) -> String {
    format!("[^{}]", class_body(chars))
}

/// Pattern consumed by `Trim`, `TrimStart` and `TrimEnd`
pub fn trim_pattern(chars: &[char]) -> String {
    if chars.is_empty() {
        return "\\s*".to_string();
    }
    format!("{}*", positive_class(chars))
}

/// `s.IndexOf(c) == index` and its start/count variants.
///
/// Returns `None` when no string can satisfy the comparison.
pub fn index_of_chars(chars: &[char], index: i64, start: Option<i64>, count: Option<i64>) -> Option<String> {
    let positive = positive_class(chars);
    let negative = negative_class(chars);
    Some(match (start, count) {
        (None, _) => format!("^{}{{{}}}{}", negative, index, positive),
        (Some(start), None) => format!("^.{{{}}}{}{{{}}}{}", start, negative, index - start, positive),
        (Some(start), Some(count)) => {
            if index >= start + count {
                return None;
            }
            format!(
                "^.{{{}}}(?=.{{{}}}){}{{{}}}{}",
                start,
                count,
                negative,
                index - start,
                positive
            )
        }
    })
}

/// `s.IndexOf("text") == index` and its start/count variants
pub fn index_of_string(text: &str, index: i64, start: Option<i64>, count: Option<i64>) -> Option<String> {
    let escaped = escape(text);
    Some(match (start, count) {
        (None, _) => format!("^(?!.{{0,{}}}{}).{{{}}}{}", index - 1, escaped, index, escaped),
        (Some(start), None) => format!(
            "^.{{{}}}(?!.{{0,{}}}{}).{{{}}}{}",
            start,
            index - start - 1,
            escaped,
            index - start,
            escaped
        ),
        (Some(start), Some(count)) => {
            if text.chars().count() as i64 > start + count - index {
                return None;
            }
            format!(
                "^.{{{}}}(?=.{{{}}})(?!.{{0,{}}}{}).{{{}}}{}",
                start,
                count,
                index - start - 1,
                escaped,
                index - start,
                escaped
            )
        }
    })
}

/// `s[index] == c` (or `!=` when `negated`)
pub fn char_at(index: i64, c: char, negated: bool) -> String {
    let class = if negated {
        negative_class(&[c])
    } else {
        positive_class(&[c])
    };
    format!("^.{{{}}}{}", index, class)
}

/// `s.Length op n`; `!=` shares the `==` pattern and is negated by the caller
pub fn length(op: BinaryOp, n: i64) -> Option<String> {
    Some(match op {
        BinaryOp::Equal | BinaryOp::NotEqual => format!("^.{{{}}}$", n),
        BinaryOp::GreaterThan => format!("^.{{{},}}$", n + 1),
        BinaryOp::GreaterThanOrEqual => format!("^.{{{},}}$", n),
        BinaryOp::LessThan => format!("^.{{0,{}}}$", n - 1),
        BinaryOp::LessThanOrEqual => format!("^.{{0,{}}}$", n),
        _ => return None,
    })
}

/// Anchors a pattern, dropping anchors that only precede or follow `.*`
pub fn anchor(pattern: &str) -> String {
    let mut anchored = format!("^{}$", pattern);
    if let Some(rest) = anchored.strip_prefix("^.*") {
        anchored = rest.to_string();
    }
    if let Some(rest) = anchored.strip_suffix(".*$") {
        anchored = rest.to_string();
    }
    anchored
}

/// Server regex options for .NET `RegexOptions` flags
pub fn options_from_flags(flags: i64) -> String {
    const IGNORE_CASE: i64 = 1;
    const MULTILINE: i64 = 2;
    const SINGLELINE: i64 = 16;
    const IGNORE_PATTERN_WHITESPACE: i64 = 32;

    let mut options = String::new();
    if flags & IGNORE_CASE != 0 {
        options.push('i');
    }
    if flags & MULTILINE != 0 {
        options.push('m');
    }
    if flags & SINGLELINE != 0 {
        options.push('s');
    }
    if flags & IGNORE_PATTERN_WHITESPACE != 0 {
        options.push('x');
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(pattern: &str, options: &str) -> ::regex::Regex {
        ::regex::Regex::new(&format!("(?{}){}", options, pattern)).unwrap()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape("x y\tz"), "x\\ y\\tz");
        assert_eq!(escape("Don't"), "Don't");
        assert_eq!(escape("[a]{1}"), "\\[a]\\{1}");
    }

    #[test]
    fn test_trim_pattern() {
        assert_eq!(trim_pattern(&[]), "\\s*");
        assert_eq!(trim_pattern(&[' ']), "\\ *");
        assert_eq!(trim_pattern(&['-', '.']), "[\\-\\.]*");
    }

    #[test]
    fn test_index_of_char() {
        assert_eq!(index_of_chars(&['b'], 1, None, None).unwrap(), "^[^b]{1}b");
        assert_eq!(index_of_chars(&['b'], 1, Some(1), None).unwrap(), "^.{1}[^b]{0}b");
        assert_eq!(
            index_of_chars(&['b'], 1, Some(1), Some(2)).unwrap(),
            "^.{1}(?=.{2})[^b]{0}b"
        );
        assert_eq!(index_of_chars(&['b'], 3, Some(1), Some(2)), None);
        assert_eq!(index_of_chars(&['b', '-'], 1, None, None).unwrap(), "^[^b\\-]{1}[b\\-]");
    }

    #[test]
    fn test_index_of_string() {
        assert_eq!(index_of_string("Xa", 1, None, None).unwrap(), "^(?!.{0,0}Xa).{1}Xa");
        assert_eq!(index_of_string("Xa", 3, Some(1), Some(2)), None);
    }

    #[test]
    fn test_length_patterns_match() {
        let eq = compile(&length(BinaryOp::Equal, 3).unwrap(), "s");
        assert!(eq.is_match("abc"));
        assert!(!eq.is_match("abcd"));
        let gt = compile(&length(BinaryOp::GreaterThan, 3).unwrap(), "s");
        assert!(gt.is_match("abcd"));
        assert!(!gt.is_match("abc"));
        let lt = compile(&length(BinaryOp::LessThan, 3).unwrap(), "s");
        assert!(lt.is_match("ab"));
        assert!(!lt.is_match("abc"));
    }

    #[test]
    fn test_char_at_matches() {
        let re = compile(&char_at(1, 'b', false), "s");
        assert!(re.is_match("abc"));
        assert!(!re.is_match("acc"));
        let not = compile(&char_at(1, 'b', true), "s");
        assert!(not.is_match("acc"));
        assert!(!not.is_match("abc"));
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor(".*abc.*"), "abc");
        assert_eq!(anchor("abc.*"), "^abc");
        assert_eq!(anchor(".*abc"), "abc$");
        assert_eq!(anchor("\\s*abc\\s*"), "^\\s*abc\\s*$");
    }

    #[test]
    fn test_options_from_flags() {
        assert_eq!(options_from_flags(1), "i");
        assert_eq!(options_from_flags(1 | 2 | 16), "ims");
        assert_eq!(options_from_flags(0), "");
    }

    #[test]
    fn test_regex_sorts_options() {
        assert_eq!(
            regex("^a", "si"),
            Bson::RegularExpression(Regex {
                pattern: "^a".into(),
                options: "is".into()
            })
        );
    }
}
