use regex::{Regex, RegexBuilder};

/// `Regexp::IGNORECASE`.
pub const IGNORECASE: u32 = 1;
/// `Regexp::EXTENDED`.
pub const EXTENDED: u32 = 2;
/// `Regexp::MULTILINE`.
pub const MULTILINE: u32 = 4;

/// Regexp payload: the source as written plus its compiled form.
///
/// `^` and `$` always match at line boundaries, and the `m` option makes `.` match newlines.
#[derive(Debug, Clone)]
pub struct RRegexp {
    pub source: String,
    pub options: u32,
    pub regex: Regex,
}

impl RRegexp {
    pub fn new(source: &str, options: u32) -> Result<Self, regex::Error> {
        let translated = source.replace("\\h", "[0-9a-fA-F]").replace("\\Z", "\\z");
        let regex = RegexBuilder::new(&translated)
            .multi_line(true)
            .case_insensitive(options & IGNORECASE != 0)
            .ignore_whitespace(options & EXTENDED != 0)
            .dot_matches_new_line(options & MULTILINE != 0)
            .build()?;
        Ok(Self {
            source: source.to_owned(),
            options,
            regex,
        })
    }

    /// Option letters in `inspect` order.
    #[must_use]
    pub fn option_letters(&self) -> String {
        let mut letters = String::new();
        if self.options & MULTILINE != 0 {
            letters.push('m');
        }
        if self.options & IGNORECASE != 0 {
            letters.push('i');
        }
        if self.options & EXTENDED != 0 {
            letters.push('x');
        }
        letters
    }

    #[must_use]
    pub fn inspect(&self) -> String {
        format!("/{}/{}", self.source.replace('/', "\\/"), self.option_letters())
    }

    /// `(?mi-x:source)` as produced by `Regexp#to_s`.
    #[must_use]
    pub fn to_s(&self) -> String {
        let on = self.option_letters();
        let off: String = ['m', 'i', 'x'].iter().filter(|c| !on.contains(**c)).collect();
        if off.is_empty() {
            format!("(?{on}:{})", self.source)
        } else {
            format!("(?{on}-{off}:{})", self.source)
        }
    }
}

/// Parses option letters (`"mix"`) into flag bits, ignoring unknown letters.
#[must_use]
pub fn parse_options(letters: &str) -> u32 {
    letters.chars().fold(0, |acc, c| match c {
        'i' => acc | IGNORECASE,
        'x' => acc | EXTENDED,
        'm' => acc | MULTILINE,
        _ => acc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_and_to_s() {
        let re = RRegexp::new("a.b", IGNORECASE | MULTILINE).unwrap();
        assert_eq!(re.inspect(), "/a.b/mi");
        assert_eq!(re.to_s(), "(?mi-x:a.b)");
        assert!(re.regex.is_match("A\nB"));
    }
}
