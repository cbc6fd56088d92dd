/*!
Replacement support: the `$n`/`${name}`/backslash template grammar,
`append_replacement`/`append_tail`, and the whole-subject `replace_*`
loops built on top of them.
*/

use widestring::U16String;

use crate::error::Error;
use crate::matcher::{MatchResult, Matcher};
use crate::subject::seg;

enum Segment {
    Literal(U16String),
    Group(usize),
}

fn push_char(buf: &mut U16String, c: char) {
    let mut units = [0u16; 2];
    buf.push_slice(c.encode_utf16(&mut units));
}

/// Parses a replacement template against the pattern's group table.
///
/// Malformed templates error here, before anything is appended.
fn parse_template(
    template: &str,
    group_count: usize,
    names: &std::collections::HashMap<String, usize>,
) -> Result<Vec<Segment>, Error> {
    let mut segments = Vec::new();
    let mut literal = U16String::new();
    let mut chars = template.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => push_char(&mut literal, escaped),
                None => {
                    return Err(Error::replacement("character to be escaped is missing", offset))
                }
            },
            '$' => {
                let number = match chars.peek().copied() {
                    None => {
                        return Err(Error::replacement("group reference is missing", offset));
                    }
                    Some((_, '{')) => {
                        chars.next();
                        let mut name = String::new();
                        let mut closed = false;
                        for (_, c) in chars.by_ref() {
                            if c == '}' {
                                closed = true;
                                break;
                            }
                            name.push(c);
                        }
                        if !closed {
                            return Err(Error::replacement("unclosed group reference", offset));
                        }
                        if name.is_empty() {
                            return Err(Error::replacement("empty group reference", offset));
                        }
                        if name.bytes().all(|b| b.is_ascii_digit()) {
                            match name.parse::<usize>() {
                                Ok(number) if number <= group_count => number,
                                _ => return Err(Error::no_such_group(name)),
                            }
                        } else {
                            match names.get(&name) {
                                Some(&number) => number,
                                None => return Err(Error::no_such_group(name)),
                            }
                        }
                    }
                    Some((_, digit)) if digit.is_ascii_digit() => {
                        chars.next();
                        let mut number = digit as usize - '0' as usize;
                        if number > group_count {
                            return Err(Error::no_such_group(number.to_string()));
                        }
                        // greedy: extend while the wider number still names
                        // an existing group
                        while let Some(&(_, next)) = chars.peek() {
                            if !next.is_ascii_digit() {
                                break;
                            }
                            let wider = number * 10 + (next as usize - '0' as usize);
                            if wider > group_count {
                                break;
                            }
                            number = wider;
                            chars.next();
                        }
                        number
                    }
                    Some(_) => {
                        return Err(Error::replacement("illegal group reference", offset));
                    }
                };
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Group(number));
            }
            c => push_char(&mut literal, c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

impl Matcher {
    /// Appends the subject up to the current match, then the expanded
    /// replacement, and moves the append position past the match.
    ///
    /// Requires a current match. A zero-width match at the current append
    /// position still gets its replacement appended once.
    pub fn append_replacement(
        &mut self,
        buf: &mut U16String,
        replacement: &str,
    ) -> Result<&mut Matcher, Error> {
        let (start, end) = self.last_range().ok_or_else(Error::no_match)?;
        let segments = parse_template(
            replacement,
            self.group_count(),
            self.pattern.named_groups(),
        )?;
        buf.push(seg(&self.subject, self.append_pos, start));
        let ovector = self.last.as_ref().ok_or_else(Error::no_match)?;
        for segment in &segments {
            match segment {
                Segment::Literal(text) => buf.push(text),
                // a group that did not participate expands to nothing
                Segment::Group(index) => {
                    if let Some((s, e)) = ovector[*index] {
                        buf.push(seg(&self.subject, s, e));
                    }
                }
            }
        }
        self.append_pos = end;
        Ok(self)
    }

    /// Appends the rest of the subject, from the append position to the
    /// end.
    pub fn append_tail<'b>(&self, buf: &'b mut U16String) -> &'b mut U16String {
        buf.push(seg(&self.subject, self.append_pos.min(self.subject.len()), self.subject.len()));
        buf
    }

    /// Replaces every match with the expanded replacement template.
    pub fn replace_all(&mut self, replacement: &str) -> Result<U16String, Error> {
        self.reset();
        let mut result = U16String::new();
        while self.find()? {
            self.append_replacement(&mut result, replacement)?;
        }
        self.append_tail(&mut result);
        Ok(result)
    }

    /// Replaces the first match with the expanded replacement template.
    pub fn replace_first(&mut self, replacement: &str) -> Result<U16String, Error> {
        self.reset();
        let mut result = U16String::new();
        if self.find()? {
            self.append_replacement(&mut result, replacement)?;
        }
        self.append_tail(&mut result);
        Ok(result)
    }

    /// Replaces every match with the output of `replacer`.
    ///
    /// The callback receives a frozen [`MatchResult`], not the live
    /// matcher, and its output is taken literally (no `$`/`\` expansion).
    pub fn replace_all_with(
        &mut self,
        mut replacer: impl FnMut(&MatchResult) -> U16String,
    ) -> Result<U16String, Error> {
        self.reset();
        let mut result = U16String::new();
        while self.find()? {
            let (start, end) = self.last_range().ok_or_else(Error::no_match)?;
            result.push(seg(&self.subject, self.append_pos, start));
            result.push(replacer(&self.to_match_result()));
            self.append_pos = end;
        }
        self.append_tail(&mut result);
        Ok(result)
    }

    /// Replaces the first match with the output of `replacer`.
    pub fn replace_first_with(
        &mut self,
        replacer: impl FnOnce(&MatchResult) -> U16String,
    ) -> Result<U16String, Error> {
        self.reset();
        let mut result = U16String::new();
        if self.find()? {
            let (start, end) = self.last_range().ok_or_else(Error::no_match)?;
            result.push(seg(&self.subject, self.append_pos, start));
            result.push(replacer(&self.to_match_result()));
            self.append_pos = end;
        }
        self.append_tail(&mut result);
        Ok(result)
    }

    /// Escapes `s` so that it expands to itself when used as a
    /// replacement: every `$` and `\` gets a protecting backslash.
    pub fn quote_replacement(s: &str) -> String {
        let mut quoted = String::with_capacity(s.len());
        for c in s.chars() {
            if c == '\\' || c == '$' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted
    }
}

#[cfg(test)]
mod tests {
    use widestring::u16str;

    use crate::error::ErrorKind;
    use crate::{Matcher, Pattern};

    fn replace_all(pattern: &str, subject: &str, replacement: &str) -> String {
        Pattern::compile(pattern)
            .unwrap()
            .matcher(subject)
            .replace_all(replacement)
            .unwrap()
            .to_string_lossy()
    }

    #[test]
    fn swap_groups() {
        assert_eq!(replace_all(r"(\w+) (\w+)", "hello world", "$2 $1"), "world hello");
    }

    #[test]
    fn named_group_reference() {
        assert_eq!(
            replace_all(r"(?<key>\w+)=(?<value>\w+)", "a=1 b=2", "${value}:${key}"),
            "1:a 2:b"
        );
    }

    #[test]
    fn numbered_brace_reference() {
        assert_eq!(replace_all(r"(a)(b)", "ab", "${2}${1}"), "ba");
    }

    #[test]
    fn greedy_group_numbers_stop_at_group_count() {
        // $11 is group 1 followed by a literal '1' when there is no group 11
        assert_eq!(replace_all(r"(a)", "a", "$11"), "a1");
    }

    #[test]
    fn backslash_escapes_are_literal() {
        assert_eq!(replace_all("a", "a", r"\$1"), "$1");
        assert_eq!(replace_all("a", "a", r"\\x"), r"\x");
    }

    #[test]
    fn unmatched_group_expands_to_nothing() {
        assert_eq!(replace_all("(x)|(y)", "xy", "<$1$2>"), "<x><y>");
    }

    #[test]
    fn zero_width_matches_replace_once_each() {
        assert_eq!(replace_all("a*", "b", "-"), "-b-");
    }

    #[test]
    fn replace_first_only_touches_the_first() {
        let result = Pattern::compile(r"\d")
            .unwrap()
            .matcher("a1b2")
            .replace_first("#")
            .unwrap();
        assert_eq!(result, u16str!("a#b2").to_ustring());
    }

    #[test]
    fn malformed_templates_error_up_front() {
        let mut m = Pattern::compile("(a)").unwrap().matcher("a");
        assert!(m.find().unwrap());
        let mut buf = widestring::U16String::new();
        for bad in [r"\", "$", "$x", "${", "${}", "${nope}", "$9"] {
            let err = m.append_replacement(&mut buf, bad).unwrap_err();
            assert!(
                matches!(
                    err.kind(),
                    ErrorKind::Replacement { .. } | ErrorKind::NoSuchGroup { .. }
                ),
                "expected a template error for {:?}, got {}",
                bad,
                err
            );
        }
        // nothing was appended by the failing calls
        assert!(buf.is_empty());
    }

    #[test]
    fn append_replacement_requires_a_match() {
        let mut m = Pattern::compile("a").unwrap().matcher("bbb");
        let mut buf = widestring::U16String::new();
        assert!(matches!(
            m.append_replacement(&mut buf, "x").unwrap_err().kind(),
            ErrorKind::NoMatchAvailable
        ));
    }

    #[test]
    fn append_loop_matches_replace_all() {
        let mut m = Pattern::compile(r"\d").unwrap().matcher("a1b2c");
        let mut buf = widestring::U16String::new();
        while m.find().unwrap() {
            m.append_replacement(&mut buf, "#").unwrap();
        }
        m.append_tail(&mut buf);
        assert_eq!(buf, u16str!("a#b#c").to_ustring());
    }

    #[test]
    fn function_form_receives_a_snapshot() {
        let result = Pattern::compile(r"\d+")
            .unwrap()
            .matcher("a12b345")
            .replace_all_with(|r| {
                let len = r.end(0).unwrap().unwrap() - r.start(0).unwrap().unwrap();
                widestring::U16String::from_str(&len.to_string())
            })
            .unwrap();
        assert_eq!(result, u16str!("a2b3").to_ustring());
    }

    #[test]
    fn function_form_output_is_literal() {
        let result = Pattern::compile("x")
            .unwrap()
            .matcher("x")
            .replace_all_with(|_| widestring::U16String::from_str("$0\\"))
            .unwrap();
        assert_eq!(result, u16str!("$0\\").to_ustring());
    }

    #[test]
    fn quote_replacement_round_trips() {
        for s in ["plain", "price: $5", r"back\slash", r"both $ and \ mixed"] {
            let result = Pattern::compile("x")
                .unwrap()
                .matcher("x")
                .replace_all(&Matcher::quote_replacement(s))
                .unwrap();
            assert_eq!(result.to_string_lossy(), s);
        }
    }
}
