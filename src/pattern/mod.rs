/*!
The compiled, shareable half of the facade: a [`Pattern`] owns the PCRE2
code objects and everything derived from the pattern source (flags, group
names, anchor analysis, resource budgets), and hands out per-search
[`Matcher`]s.
*/

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use bon::bon;
use log::debug;
use pcre2_sys::{
    PCRE2_ANCHORED, PCRE2_CASELESS, PCRE2_DOTALL, PCRE2_ENDANCHORED, PCRE2_EXTENDED,
    PCRE2_LITERAL, PCRE2_MULTILINE, PCRE2_NEWLINE_LF, PCRE2_UCP, PCRE2_UTF,
};
use unicode_normalization::UnicodeNormalization;
use widestring::U16String;

use crate::error::Error;
use crate::ffi::{self, Code, CompileContext};
use crate::matcher::Matcher;
use crate::pattern::rewrite::AnchorInfo;
use crate::subject::{seg, IntoSubject};

pub(crate) mod rewrite;

bitflags! {
    /// Pattern compile flags.
    ///
    /// `UNICODE_CASE` is accepted for interface compatibility but is a
    /// no-op: matching always runs in UTF mode, and UTF mode case-folds
    /// with full Unicode rules. A case-insensitive pattern will therefore
    /// match the Kelvin sign against `k` even without the flag.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Flags: u32 {
        /// Case-insensitive matching (`PCRE2_CASELESS`).
        const CASE_INSENSITIVE = 1 << 0;
        /// `^`/`$` also match at line boundaries (`PCRE2_MULTILINE`).
        const MULTILINE = 1 << 1;
        /// `.` also matches line terminators (`PCRE2_DOTALL`).
        const DOTALL = 1 << 2;
        /// Accepted for compatibility; Unicode case folding is always on.
        const UNICODE_CASE = 1 << 3;
        /// `\w`, `\d`, `\s`, `\b` use Unicode properties (`PCRE2_UCP`).
        const UNICODE_CHARACTER_CLASS = 1 << 4;
        /// Only `\n` terminates a line.
        const UNIX_LINES = 1 << 5;
        /// Whitespace and `#` comments in the pattern are ignored
        /// (`PCRE2_EXTENDED`).
        const COMMENTS = 1 << 6;
        /// The pattern is a literal string (`PCRE2_LITERAL`).
        const LITERAL = 1 << 7;
        /// Match under canonical equivalence: both pattern and subject are
        /// decomposed to NFD before matching, and all reported offsets are
        /// mapped back to the original subject.
        const CANON_EQ = 1 << 8;
    }
}

/// Resource budgets and the JIT switch, resolved from the environment at
/// compile time and overridable per pattern.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Limits {
    pub(crate) match_limit: Option<u32>,
    pub(crate) depth_limit: Option<u32>,
    pub(crate) heap_limit: Option<u32>,
    pub(crate) jit: bool,
}

impl Limits {
    fn from_env() -> Limits {
        Limits {
            match_limit: env_limit("PCRE2_MATCHER_MATCH_LIMIT"),
            depth_limit: env_limit("PCRE2_MATCHER_DEPTH_LIMIT"),
            heap_limit: env_limit("PCRE2_MATCHER_HEAP_LIMIT"),
            jit: env::var("PCRE2_MATCHER_JIT").map(|v| v != "false").unwrap_or(true),
        }
    }
}

fn env_limit(name: &str) -> Option<u32> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!("ignoring unparsable {}={}", name, raw);
            None
        }
    }
}

fn compile_options(flags: Flags) -> u32 {
    let mut options = PCRE2_UTF;
    if flags.contains(Flags::CASE_INSENSITIVE) {
        options |= PCRE2_CASELESS;
    }
    if flags.contains(Flags::LITERAL) {
        // PCRE2_LITERAL tolerates only a small option set; the structural
        // flags are meaningless for a literal anyway.
        return options | PCRE2_LITERAL;
    }
    if flags.contains(Flags::MULTILINE) {
        options |= PCRE2_MULTILINE;
    }
    if flags.contains(Flags::DOTALL) {
        options |= PCRE2_DOTALL;
    }
    if flags.contains(Flags::COMMENTS) {
        options |= PCRE2_EXTENDED;
    }
    if flags.contains(Flags::UNICODE_CHARACTER_CLASS) {
        options |= PCRE2_UCP;
    }
    options
}

fn compile(source: &str, options: u32, unix_lines: bool, limits: &Limits) -> Result<Code, Error> {
    let mut ctx = CompileContext::new();
    if unix_lines {
        ctx.set_newline(PCRE2_NEWLINE_LF);
    }
    let mut code = Code::new(source, options, ctx)?;
    if limits.jit && ffi::jit_available() {
        if let Err(err) = code.jit_compile() {
            debug!("JIT compilation failed, using the interpreter: {}", err);
        }
    }
    Ok(code)
}

pub(crate) struct Inner {
    source: String,
    /// What actually gets compiled: the source, NFD-decomposed under
    /// `CANON_EQ`.
    compiled_source: String,
    flags: Flags,
    limits: Limits,
    options: u32,
    unix_lines: bool,
    find_code: Code,
    matches_code: OnceLock<Code>,
    looking_at_code: OnceLock<Code>,
    rewritten_code: OnceLock<Code>,
    group_count: usize,
    names: Arc<HashMap<String, usize>>,
    anchors: AnchorInfo,
}

impl Inner {
    pub(crate) fn find_code(&self) -> &Code {
        &self.find_code
    }

    /// The `ANCHORED | ENDANCHORED` variant behind `matches()`.
    ///
    /// Compiled on first demand. Losing the publication race costs one
    /// duplicate compile of an identical pattern, never a wrong result.
    pub(crate) fn matches_code(&self) -> Result<&Code, Error> {
        if let Some(code) = self.matches_code.get() {
            return Ok(code);
        }
        let code = compile(
            &self.compiled_source,
            self.options | PCRE2_ANCHORED | PCRE2_ENDANCHORED,
            self.unix_lines,
            &self.limits,
        )?;
        debug!("compiled full-match variant of `{}`", self.source);
        Ok(self.matches_code.get_or_init(|| code))
    }

    /// The `ANCHORED` variant behind `looking_at()`.
    pub(crate) fn looking_at_code(&self) -> Result<&Code, Error> {
        if let Some(code) = self.looking_at_code.get() {
            return Ok(code);
        }
        let code = compile(
            &self.compiled_source,
            self.options | PCRE2_ANCHORED,
            self.unix_lines,
            &self.limits,
        )?;
        debug!("compiled prefix-match variant of `{}`", self.source);
        Ok(self.looking_at_code.get_or_init(|| code))
    }

    /// The region-relative anchor variant: `^` rewritten to `\G`, `$`
    /// deleted. Only ever requested when the anchor scan found something.
    pub(crate) fn rewritten_code(&self) -> Result<&Code, Error> {
        if let Some(code) = self.rewritten_code.get() {
            return Ok(code);
        }
        let source = self.anchors.rewritten.as_deref().unwrap_or(&self.compiled_source);
        let code = compile(source, self.options, self.unix_lines, &self.limits)?;
        debug!("compiled region-anchor variant of `{}`", self.source);
        Ok(self.rewritten_code.get_or_init(|| code))
    }

    pub(crate) fn anchors(&self) -> &AnchorInfo {
        &self.anchors
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.limits
    }

    pub(crate) fn names(&self) -> &Arc<HashMap<String, usize>> {
        &self.names
    }
}

/// A compiled pattern.
///
/// A `Pattern` is immutable, cheap to clone, and safe to share across
/// threads without synchronization; every thread gets its own [`Matcher`]
/// from [`Pattern::matcher`].
///
/// ## Example
/// ```
/// use pcre2_matcher::Pattern;
///
/// let pattern = Pattern::compile(r"(\w+)@(\w+\.\w+)")?;
/// let mut m = pattern.matcher("user@example.com");
/// assert!(m.find()?);
/// assert_eq!(m.group(2)?.unwrap().to_string_lossy(), "example.com");
/// # Ok::<(), pcre2_matcher::Error>(())
/// ```
#[derive(Clone)]
pub struct Pattern {
    pub(crate) inner: Arc<Inner>,
}

#[bon]
impl Pattern {
    /// Compiles a pattern with full control over flags and budgets:
    /// `Pattern::builder(src).flags(..).match_limit(..).build()`.
    ///
    /// Compilation failures surface here, with the PCRE2 message and the
    /// offset into the pattern; they are never raised at match time.
    #[builder]
    pub fn new(
        #[builder(start_fn)] pattern: &str,

        #[builder(default = Flags::empty())] flags: Flags,

        /// Match-steps budget; overrides `PCRE2_MATCHER_MATCH_LIMIT`.
        match_limit: Option<u32>,

        /// Backtracking-depth budget; overrides
        /// `PCRE2_MATCHER_DEPTH_LIMIT`. Disables the JIT, which cannot
        /// enforce it.
        depth_limit: Option<u32>,

        /// Heap budget in KiB; overrides `PCRE2_MATCHER_HEAP_LIMIT`.
        /// Disables the JIT, which cannot enforce it.
        heap_limit: Option<u32>,

        /// Overrides the process-wide `PCRE2_MATCHER_JIT` switch.
        jit: Option<bool>,
    ) -> Result<Pattern, Error> {
        let mut limits = Limits::from_env();
        if let Some(v) = match_limit {
            limits.match_limit = Some(v);
        }
        if let Some(v) = depth_limit {
            limits.depth_limit = Some(v);
        }
        if let Some(v) = heap_limit {
            limits.heap_limit = Some(v);
        }
        if let Some(v) = jit {
            limits.jit = v;
        }
        if limits.depth_limit.is_some() || limits.heap_limit.is_some() {
            limits.jit = false;
        }

        let compiled_source: String = if flags.contains(Flags::CANON_EQ) {
            pattern.nfd().collect()
        } else {
            pattern.to_owned()
        };
        let options = compile_options(flags);
        let unix_lines = flags.contains(Flags::UNIX_LINES);
        let anchors = if flags.contains(Flags::LITERAL) {
            AnchorInfo::literal()
        } else {
            rewrite::scan(&compiled_source)
        };

        let find_code = compile(&compiled_source, options, unix_lines, &limits)?;
        let group_count = find_code.capture_count()?;
        let mut names = HashMap::new();
        for (name, number) in find_code.name_table()? {
            names.entry(name).or_insert(number);
        }

        Ok(Pattern {
            inner: Arc::new(Inner {
                source: pattern.to_owned(),
                compiled_source,
                flags,
                limits,
                options,
                unix_lines,
                find_code,
                matches_code: OnceLock::new(),
                looking_at_code: OnceLock::new(),
                rewritten_code: OnceLock::new(),
                group_count,
                names: Arc::new(names),
                anchors,
            }),
        })
    }
}

impl Pattern {
    /// Compiles a pattern with no flags.
    pub fn compile(pattern: &str) -> Result<Pattern, Error> {
        Pattern::builder(pattern).build()
    }

    /// Compiles a pattern with the given flags.
    pub fn compile_with(pattern: &str, flags: Flags) -> Result<Pattern, Error> {
        Pattern::builder(pattern).flags(flags).build()
    }

    /// One-shot full match of `pattern` against `input`.
    pub fn matches(pattern: &str, input: impl IntoSubject) -> Result<bool, Error> {
        let mut matcher = Pattern::compile(pattern)?.matcher(input);
        matcher.matches()
    }

    /// Creates a fresh matcher over `subject`.
    pub fn matcher(&self, subject: impl IntoSubject) -> Matcher {
        Matcher::new(self.clone(), subject.into_subject())
    }

    /// The pattern source this pattern was compiled from.
    pub fn pattern(&self) -> &str {
        &self.inner.source
    }

    /// The flags this pattern was compiled with.
    pub fn flags(&self) -> Flags {
        self.inner.flags
    }

    /// Number of capturing groups, excluding the whole-match group 0.
    pub fn group_count(&self) -> usize {
        self.inner.group_count
    }

    /// Mapping from group name to its 1-based group number.
    pub fn named_groups(&self) -> &HashMap<String, usize> {
        &self.inner.names
    }

    /// Splits `input` around matches of this pattern, dropping trailing
    /// empty pieces. Equivalent to `split_n(input, 0)`.
    pub fn split(&self, input: impl IntoSubject) -> Result<Vec<U16String>, Error> {
        self.split_impl(input.into_subject(), 0, false)
    }

    /// Splits `input` around matches of this pattern.
    ///
    /// A positive `limit` caps the number of pieces, with the last piece
    /// holding the unsplit rest; zero keeps all pieces but drops trailing
    /// empty ones; a negative limit keeps everything. A zero-width match
    /// at the very beginning never produces a leading empty piece.
    pub fn split_n(&self, input: impl IntoSubject, limit: isize) -> Result<Vec<U16String>, Error> {
        self.split_impl(input.into_subject(), limit, false)
    }

    /// Like [`split_n`](Pattern::split_n), but the matched delimiters are
    /// interleaved with the pieces.
    pub fn split_with_delimiters(
        &self,
        input: impl IntoSubject,
        limit: isize,
    ) -> Result<Vec<U16String>, Error> {
        self.split_impl(input.into_subject(), limit, true)
    }

    fn split_impl(
        &self,
        subject: U16String,
        limit: isize,
        with_delimiters: bool,
    ) -> Result<Vec<U16String>, Error> {
        let mut matcher = self.matcher(subject.clone());
        let mut pieces: Vec<U16String> = Vec::new();
        let mut index = 0;
        let limited = limit > 0;
        while matcher.find()? {
            let (start, end) = matcher.last_range().unwrap_or((0, 0));
            if !limited || (pieces.len() as isize) < limit - 1 {
                if index == 0 && index == start && start == end {
                    // no empty leading piece for a zero-width match at the
                    // beginning of the input
                    continue;
                }
                pieces.push(seg(&subject, index, start).to_ustring());
                if with_delimiters {
                    pieces.push(seg(&subject, start, end).to_ustring());
                }
                index = end;
            } else if pieces.len() as isize == limit - 1 {
                pieces.push(seg(&subject, index, subject.len()).to_ustring());
                index = end;
            }
        }
        if index == 0 && pieces.is_empty() {
            return Ok(vec![subject]);
        }
        if !limited || (pieces.len() as isize) < limit {
            pieces.push(seg(&subject, index, subject.len()).to_ustring());
        }
        if limit == 0 {
            while pieces.last().is_some_and(|p| p.is_empty()) {
                pieces.pop();
            }
        }
        Ok(pieces)
    }

    /// Lazily splits `input` around matches of this pattern.
    ///
    /// Single-pass; trailing empty pieces are kept, like `split_n` with a
    /// negative limit. If the pattern never matches, the sole element is
    /// the whole input.
    pub fn split_iter(&self, input: impl IntoSubject) -> Split {
        let subject = input.into_subject();
        Split {
            matcher: self.matcher(subject.clone()),
            subject,
            index: 0,
            done: false,
        }
    }

    /// A predicate testing whether this pattern is found in its input.
    ///
    /// Budget-exceeded searches report `false`.
    pub fn as_predicate(&self) -> impl Fn(&str) -> bool {
        let pattern = self.clone();
        move |s| pattern.matcher(s).find().unwrap_or(false)
    }

    /// A predicate testing whether this pattern matches its whole input.
    pub fn as_match_predicate(&self) -> impl Fn(&str) -> bool {
        let pattern = self.clone();
        move |s| pattern.matcher(s).matches().unwrap_or(false)
    }

    /// Returns a regex that matches `s` literally, by wrapping it in
    /// `\Q...\E` and splicing around any `\E` already inside it.
    pub fn quote(s: &str) -> String {
        match s.find("\\E") {
            None => format!("\\Q{}\\E", s),
            Some(_) => {
                let mut quoted = String::with_capacity(s.len() * 2);
                quoted.push_str("\\Q");
                let mut rest = s;
                while let Some(i) = rest.find("\\E") {
                    quoted.push_str(&rest[..i]);
                    quoted.push_str("\\E\\\\E\\Q");
                    rest = &rest[i + 2..];
                }
                quoted.push_str(rest);
                quoted.push_str("\\E");
                quoted
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.source)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("pattern", &self.inner.source)
            .field("flags", &self.inner.flags)
            .finish()
    }
}

/// Lazy iterator over the pieces of a split subject.
pub struct Split {
    matcher: Matcher,
    subject: U16String,
    index: usize,
    done: bool,
}

impl Iterator for Split {
    type Item = Result<U16String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.matcher.find() {
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Ok(true) => {
                    let (start, end) = self.matcher.last_range().unwrap_or((0, 0));
                    if self.index == 0 && start == 0 && end == 0 {
                        continue;
                    }
                    let piece = seg(&self.subject, self.index, start).to_ustring();
                    self.index = end;
                    return Some(Ok(piece));
                }
                Ok(false) => {
                    self.done = true;
                    return Some(Ok(
                        seg(&self.subject, self.index, self.subject.len()).to_ustring()
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use widestring::u16str;

    use super::*;

    fn split_strs(pattern: &Pattern, input: &str, limit: isize) -> Vec<String> {
        pattern
            .split_n(input, limit)
            .unwrap()
            .iter()
            .map(|p| p.to_string_lossy())
            .collect()
    }

    #[test]
    fn compile_error_surfaces_at_construction() {
        let err = Pattern::compile("a(b").unwrap_err();
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn one_shot_matches() {
        assert!(Pattern::matches(r"\d+", "123").unwrap());
        assert!(!Pattern::matches(r"\d+", "12a").unwrap());
    }

    #[test]
    fn named_groups_are_one_based() {
        let pattern = Pattern::compile("(?<year>\\d{4})-(?<month>\\d{2})").unwrap();
        assert_eq!(pattern.group_count(), 2);
        assert_eq!(pattern.named_groups()["year"], 1);
        assert_eq!(pattern.named_groups()["month"], 2);
    }

    #[test]
    fn split_limits() {
        let pattern = Pattern::compile(":").unwrap();
        assert_eq!(split_strs(&pattern, "boo:and:foo", 2), ["boo", "and:foo"]);
        assert_eq!(split_strs(&pattern, "boo:and:foo", 5), ["boo", "and", "foo"]);
        assert_eq!(split_strs(&pattern, "boo:and:foo", -2), ["boo", "and", "foo"]);

        let pattern = Pattern::compile("o").unwrap();
        assert_eq!(split_strs(&pattern, "boo:and:foo", 5), ["b", "", ":and:f", "", ""]);
        assert_eq!(split_strs(&pattern, "boo:and:foo", -2), ["b", "", ":and:f", "", ""]);
        assert_eq!(split_strs(&pattern, "boo:and:foo", 0), ["b", "", ":and:f"]);
    }

    #[test]
    fn split_no_match_returns_whole_input() {
        let pattern = Pattern::compile("x").unwrap();
        assert_eq!(split_strs(&pattern, "abc", 0), ["abc"]);
    }

    #[test]
    fn split_skips_leading_zero_width_piece() {
        let pattern = Pattern::compile("").unwrap();
        // a zero-width match at position 0 produces no leading empty piece
        assert_eq!(split_strs(&pattern, "ab", -1), ["a", "b", ""]);
    }

    #[test]
    fn split_with_delimiters_interleaves() {
        let pattern = Pattern::compile(",").unwrap();
        let parts: Vec<String> = pattern
            .split_with_delimiters("a,b,c", -1)
            .unwrap()
            .iter()
            .map(|p| p.to_string_lossy())
            .collect();
        assert_eq!(parts, ["a", ",", "b", ",", "c"]);
    }

    #[test]
    fn split_iter_is_lazy_and_complete() {
        let pattern = Pattern::compile(":").unwrap();
        let pieces: Vec<U16String> = pattern.split_iter("a:b:").map(|r| r.unwrap()).collect();
        assert_eq!(
            pieces,
            vec![u16str!("a").to_ustring(), u16str!("b").to_ustring(), U16String::new()]
        );
    }

    #[test]
    fn predicates() {
        let pattern = Pattern::compile("aba").unwrap();
        let found = pattern.as_predicate();
        let full = pattern.as_match_predicate();
        assert!(found("xxabaxx"));
        assert!(!full("xxabaxx"));
        assert!(full("aba"));
    }

    #[test]
    fn quote_handles_embedded_end_quote() {
        assert_eq!(Pattern::quote("ab"), "\\Qab\\E");
        assert_eq!(Pattern::quote("a\\Eb"), "\\Qa\\E\\\\E\\Qb\\E");
        let s = "a.b\\E$c";
        let pattern = Pattern::compile(&Pattern::quote(s)).unwrap();
        assert!(pattern.matcher(s).matches().unwrap());
    }

    #[test]
    fn literal_flag_disables_metacharacters() {
        let pattern = Pattern::compile_with("a.b", Flags::LITERAL).unwrap();
        assert!(pattern.matcher("a.b").matches().unwrap());
        assert!(!pattern.matcher("axb").matches().unwrap());
    }

    #[test]
    fn case_insensitive_folds_with_unicode_rules() {
        let pattern = Pattern::compile_with("k", Flags::CASE_INSENSITIVE).unwrap();
        assert!(pattern.matcher("K").matches().unwrap());
        // UTF mode always folds with Unicode rules, so the Kelvin sign
        // matches even without UNICODE_CASE
        assert!(pattern.matcher("\u{212A}").matches().unwrap());
    }

    #[test]
    fn multiline_lets_anchors_match_at_line_boundaries() {
        let pattern = Pattern::compile_with("^b", Flags::MULTILINE).unwrap();
        let mut m = pattern.matcher("a\nb");
        assert!(m.find().unwrap());
        assert_eq!(m.start(0).unwrap(), Some(2));

        let pattern = Pattern::compile("^b").unwrap();
        assert!(!pattern.matcher("a\nb").find().unwrap());
    }

    #[test]
    fn unix_lines_only_recognizes_line_feed() {
        let flags = Flags::MULTILINE | Flags::UNIX_LINES;
        let pattern = Pattern::compile_with("^b", flags).unwrap();
        assert!(pattern.matcher("a\nb").find().unwrap());
        assert!(!pattern.matcher("a\rb").find().unwrap());
    }

    #[test]
    fn dotall_lets_dot_cross_lines() {
        assert!(Pattern::compile_with("a.b", Flags::DOTALL)
            .unwrap()
            .matcher("a\nb")
            .matches()
            .unwrap());
        assert!(!Pattern::compile("a.b").unwrap().matcher("a\nb").matches().unwrap());
    }

    #[test]
    fn comments_flag_ignores_pattern_whitespace() {
        let pattern = Pattern::compile_with("a b  # trailing comment", Flags::COMMENTS).unwrap();
        assert!(pattern.matcher("ab").matches().unwrap());
    }

    #[test]
    fn unicode_character_class_widens_word_chars() {
        let pattern = Pattern::compile_with(r"\w+", Flags::UNICODE_CHARACTER_CLASS).unwrap();
        assert!(pattern.matcher("héllo").matches().unwrap());
    }

    #[test]
    fn display_is_the_source() {
        let pattern = Pattern::compile("a+").unwrap();
        assert_eq!(pattern.to_string(), "a+");
    }
}
