//! Text helpers shared by String and Symbol methods.

use std::fmt::Write as _;

/// Double-quoted literal form of `s`, as printed by `String#inspect`.
#[must_use]
pub fn inspect(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            '\x1b' => out.push_str("\\e"),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => out.push_str("\\#"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `String#chomp` with an optional separator.
///
/// Without a separator one trailing `\r\n`, `\n` or `\r` is removed. An empty separator
/// removes every trailing newline (each optionally preceded by `\r`). Any other separator is
/// removed once if it is a suffix.
#[must_use]
pub fn chomp<'a>(s: &'a str, separator: Option<&str>) -> &'a str {
    match separator {
        None => s
            .strip_suffix("\r\n")
            .or_else(|| s.strip_suffix('\n'))
            .or_else(|| s.strip_suffix('\r'))
            .unwrap_or(s),
        Some("") => {
            let mut rest = s;
            while let Some(stripped) = rest.strip_suffix('\n') {
                rest = stripped.strip_suffix('\r').unwrap_or(stripped);
            }
            rest
        }
        Some("\n") => chomp(s, None),
        Some(sep) => s.strip_suffix(sep).unwrap_or(s),
    }
}

/// `String#capitalize`: first character upcased, the rest downcased.
#[must_use]
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[must_use]
pub fn swapcase(s: &str) -> String {
    s.chars()
        .flat_map(|c| -> Box<dyn Iterator<Item = char>> {
            if c.is_uppercase() {
                Box::new(c.to_lowercase())
            } else {
                Box::new(c.to_uppercase())
            }
        })
        .collect()
}

/// Whether `name` can be written as a bare symbol literal (`:name`).
#[must_use]
pub fn is_plain_symbol(name: &str) -> bool {
    const OPERATORS: &[&str] = &[
        "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "<=>", "===", "=~", "!~", "[]", "[]=", "<<",
        ">>", "!", "&", "|", "^", "~", "+@", "-@",
    ];
    if OPERATORS.contains(&name) {
        return true;
    }
    let body = name
        .strip_prefix("@@")
        .or_else(|| name.strip_prefix('@'))
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name);
    let body = body
        .strip_suffix('?')
        .or_else(|| body.strip_suffix('!'))
        .or_else(|| body.strip_suffix('='))
        .unwrap_or(body);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// `Symbol#inspect`.
#[must_use]
pub fn inspect_symbol(name: &str) -> String {
    if is_plain_symbol(name) {
        format!(":{name}")
    } else {
        format!(":{}", inspect(name))
    }
}

/// Leading integer of `s` in `base`, as `String#to_i` reads it; 0 when there is none.
#[must_use]
pub fn leading_integer(s: &str, base: u32) -> Option<num_bigint::BigInt> {
    let trimmed = s.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: String = digits
        .chars()
        .take_while(|c| c.is_digit(base) || *c == '_')
        .filter(|c| *c != '_')
        .collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude = num_bigint::BigInt::parse_bytes(digits.as_bytes(), base)?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Leading float of `s`, as `String#to_f` reads it.
#[must_use]
pub fn leading_float(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = trimmed.as_bytes();
    while end < bytes.len() {
        let c = bytes[end];
        let ok = match c {
            b'0'..=b'9' | b'_' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end += 1;
    }
    let candidate: String = trimmed[..end].chars().filter(|c| *c != '_').collect();
    let mut candidate = candidate.as_str();
    loop {
        if let Ok(value) = candidate.parse::<f64>() {
            return value;
        }
        if candidate.is_empty() {
            return 0.0;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
}

/// Whitespace-separated fields, as `split` with no pattern produces them. A positive `limit`
/// caps the number of fields; the last one keeps the rest of the text.
#[must_use]
pub fn awk_split(s: &str, limit: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if limit > 0 && fields.len() + 1 == limit {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}

/// Byte offset of the character at `index`, or the length when past the end.
#[must_use]
pub fn byte_offset(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map_or(s.len(), |(offset, _)| offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chomp_default_separators() {
        assert_eq!(chomp("hello", None), "hello");
        assert_eq!(chomp("hello\n", None), "hello");
        assert_eq!(chomp("hello\r\n", None), "hello");
        assert_eq!(chomp("hello\n\r", None), "hello\n");
        assert_eq!(chomp("hello\r", None), "hello");
        assert_eq!(chomp("hello \n there", None), "hello \n there");
    }

    #[test]
    fn chomp_paragraph_mode_and_suffix() {
        assert_eq!(chomp("hello\r\n\r\n", Some("")), "hello");
        assert_eq!(chomp("hello\r\n\r\r\n", Some("")), "hello\r\n\r");
        assert_eq!(chomp("hello", Some("llo")), "he");
        assert_eq!(chomp("hello", Some("d")), "hello");
    }

    #[test]
    fn inspect_escapes() {
        assert_eq!(inspect("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(inspect("#{x} #y"), "\"\\#{x} #y\"");
        assert_eq!(inspect("\u{1}"), "\"\\u0001\"");
    }

    #[test]
    fn symbol_inspect() {
        assert_eq!(inspect_symbol("foo"), ":foo");
        assert_eq!(inspect_symbol("foo?"), ":foo?");
        assert_eq!(inspect_symbol("@n"), ":@n");
        assert_eq!(inspect_symbol("<=>"), ":<=>");
        assert_eq!(inspect_symbol("foo bar"), ":\"foo bar\"");
    }

    #[test]
    fn numeric_prefixes() {
        assert_eq!(leading_integer("  42abc", 10), Some(42.into()));
        assert_eq!(leading_integer("-1_000", 10), Some((-1000).into()));
        assert_eq!(leading_integer("ff", 16), Some(255.into()));
        assert_eq!(leading_integer("abc", 10), None);
        assert!((leading_float("3.5kg") - 3.5).abs() < f64::EPSILON);
        assert!((leading_float("1e3") - 1000.0).abs() < f64::EPSILON);
        assert!(leading_float("x").abs() < f64::EPSILON);
    }

    #[test]
    fn whitespace_split() {
        assert_eq!(awk_split("  a b\t c  ", 0), vec!["a", "b", "c"]);
        assert_eq!(awk_split("a b  c ", 2), vec!["a", "b  c "]);
        assert!(awk_split("   ", 0).is_empty());
    }

    #[test]
    fn char_offsets() {
        assert_eq!(byte_offset("héllo", 2), 3);
        assert_eq!(byte_offset("abc", 5), 3);
    }
}
