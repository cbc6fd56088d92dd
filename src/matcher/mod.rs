/*!
The per-search half of the facade.

A [`Matcher`] owns its subject, its region, its PCRE2 scratch data and the
result of the last search. It is single-owner state: share the
[`Pattern`](crate::Pattern), not the matcher.

All public offsets are UTF-16 code-unit indices into the subject.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use pcre2_sys::{PCRE2_ANCHORED, PCRE2_ENDANCHORED};
use widestring::{U16Str, U16String};

use crate::error::{Error, ErrorKind};
use crate::ffi::{Code, MatchContext, MatchData};
use crate::matcher::coord::SubjectMap;
use crate::matcher::exec::Exec;
use crate::matcher::region::{policy, Op, Policy};
use crate::pattern::{Flags, Inner, Pattern};
use crate::private;
use crate::subject::{seg, IntoSubject};

pub(crate) mod coord;
mod exec;
mod region;
mod replace;
mod snapshot;

pub use snapshot::MatchResult;

/// Start/end pairs per group, in host coordinates; `None` for groups that
/// did not participate in the match.
pub(crate) type Ovector = Vec<Option<(usize, usize)>>;

/// A capture group reference: a `usize` index or a `&str` name.
pub trait GroupRef: private::Sealed {
    #[doc(hidden)]
    fn resolve(&self, group_count: usize, names: &HashMap<String, usize>) -> Result<usize, Error>;
}

impl private::Sealed for usize {}
impl GroupRef for usize {
    fn resolve(&self, group_count: usize, _: &HashMap<String, usize>) -> Result<usize, Error> {
        if *self <= group_count {
            Ok(*self)
        } else {
            Err(Error::no_such_group(self.to_string()))
        }
    }
}

impl private::Sealed for i32 {}
impl GroupRef for i32 {
    fn resolve(&self, group_count: usize, names: &HashMap<String, usize>) -> Result<usize, Error> {
        if *self < 0 {
            return Err(Error::no_such_group(self.to_string()));
        }
        (*self as usize).resolve(group_count, names)
    }
}

impl private::Sealed for &str {}
impl GroupRef for &str {
    fn resolve(&self, _: usize, names: &HashMap<String, usize>) -> Result<usize, Error> {
        names.get(*self).copied().ok_or_else(|| Error::no_such_group(*self))
    }
}

/// Advances a host offset by one code unit, or by two when it sits on a
/// surrogate pair, so a resume point never lands inside a code point.
fn advance(subject: &U16Str, at: usize) -> usize {
    let units = subject.as_slice();
    if at + 1 < units.len()
        && (0xD800..0xDC00).contains(&units[at])
        && (0xDC00..0xE000).contains(&units[at + 1])
    {
        at + 2
    } else {
        at + 1
    }
}

/// A stateful searcher over one subject.
///
/// Created by [`Pattern::matcher`]. A matcher starts *fresh*; a successful
/// `matches`/`looking_at`/`find` moves it to *matched*, a failed search or
/// [`reset`](Matcher::reset) to *unmatched*. Positional accessors and
/// `append_replacement` error unless the matcher holds a current match.
///
/// ## Example
/// ```
/// use pcre2_matcher::Pattern;
///
/// let mut m = Pattern::compile(r"(?<word>\w+)")?.matcher("one two");
/// assert!(m.find()?);
/// assert_eq!(m.group("word")?.unwrap().to_string_lossy(), "one");
/// assert!(m.find()?);
/// assert_eq!((m.start(0)?, m.end(0)?), (Some(4), Some(7)));
/// # Ok::<(), pcre2_matcher::Error>(())
/// ```
pub struct Matcher {
    pattern: Pattern,
    subject: U16String,
    map: SubjectMap,
    region_start: usize,
    region_end: usize,
    anchoring_bounds: bool,
    transparent_bounds: bool,
    last: Option<Ovector>,
    append_pos: usize,
    hit_end: bool,
    require_end: bool,
    match_data: MatchData,
    match_ctx: MatchContext,
}

impl Matcher {
    pub(crate) fn new(pattern: Pattern, subject: U16String) -> Matcher {
        let map = SubjectMap::build(&subject, pattern.flags().contains(Flags::CANON_EQ));
        let match_data = MatchData::new(pattern.inner.find_code());
        let match_ctx = configure_context(&pattern);
        let region_end = subject.len();
        Matcher {
            pattern,
            subject,
            map,
            region_start: 0,
            region_end,
            anchoring_bounds: true,
            transparent_bounds: false,
            last: None,
            append_pos: 0,
            hit_end: false,
            require_end: false,
            match_data,
            match_ctx,
        }
    }

    /// The pattern this matcher currently searches with.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The subject, in UTF-16 code units.
    pub fn subject(&self) -> &U16Str {
        &self.subject
    }

    /// Clears the match state and restores the region to the full subject.
    ///
    /// The `hit_end`/`require_end` latches deliberately survive a reset;
    /// they describe the last search attempt, not the current state.
    pub fn reset(&mut self) -> &mut Matcher {
        self.last = None;
        self.append_pos = 0;
        self.region_start = 0;
        self.region_end = self.subject.len();
        self
    }

    /// Resets this matcher against a new subject.
    pub fn reset_with(&mut self, subject: impl IntoSubject) -> &mut Matcher {
        self.subject = subject.into_subject();
        self.map = SubjectMap::build(&self.subject, self.pattern.flags().contains(Flags::CANON_EQ));
        self.reset()
    }

    /// Switches this matcher to a different pattern.
    ///
    /// Resets the match state and reconfigures the resource budgets; the
    /// subject, bounds flags and latches are kept.
    pub fn use_pattern(&mut self, pattern: &Pattern) -> &mut Matcher {
        self.pattern = pattern.clone();
        self.map = SubjectMap::build(&self.subject, self.pattern.flags().contains(Flags::CANON_EQ));
        self.match_data = MatchData::new(self.pattern.inner.find_code());
        self.match_ctx = configure_context(&self.pattern);
        self.reset()
    }

    /// Restricts where matches may start and end.
    pub fn region(&mut self, start: usize, end: usize) -> Result<&mut Matcher, Error> {
        if start > end || end > self.subject.len() {
            return Err(Error::new(ErrorKind::Region { start, end, len: self.subject.len() }));
        }
        self.last = None;
        self.region_start = start;
        self.region_end = end;
        Ok(self)
    }

    pub fn region_start(&self) -> usize {
        self.region_start
    }

    pub fn region_end(&self) -> usize {
        self.region_end
    }

    /// Whether `^`/`$` match at the region boundaries (default true).
    pub fn has_anchoring_bounds(&self) -> bool {
        self.anchoring_bounds
    }

    pub fn use_anchoring_bounds(&mut self, yes: bool) -> &mut Matcher {
        self.anchoring_bounds = yes;
        self
    }

    /// Whether lookarounds and `\b` see past the region (default false).
    pub fn has_transparent_bounds(&self) -> bool {
        self.transparent_bounds
    }

    pub fn use_transparent_bounds(&mut self, yes: bool) -> &mut Matcher {
        self.transparent_bounds = yes;
        self
    }

    /// True if the last search consumed input up to the subject end.
    pub fn hit_end(&self) -> bool {
        self.hit_end
    }

    /// True if more input could have turned the last match into a failure.
    pub fn require_end(&self) -> bool {
        self.require_end
    }

    /// True if the matcher holds a current match.
    pub fn has_match(&self) -> bool {
        self.last.is_some()
    }

    /// Attempts to match the entire region against the pattern.
    pub fn matches(&mut self) -> Result<bool, Error> {
        self.anchored_op(true)
    }

    /// Attempts to match the region prefix against the pattern.
    pub fn looking_at(&mut self) -> Result<bool, Error> {
        self.anchored_op(false)
    }

    /// Finds the next match, resuming after the previous one.
    pub fn find(&mut self) -> Result<bool, Error> {
        let from = match self.last.as_ref().and_then(|o| o[0]) {
            Some((_, end)) => end,
            None => self.region_start,
        };
        self.search_from(from)
    }

    /// Finds the next match starting at `offset`, which must lie inside
    /// the current region.
    pub fn find_at(&mut self, offset: usize) -> Result<bool, Error> {
        if offset < self.region_start || offset > self.region_end {
            return Err(Error::new(ErrorKind::Offset {
                offset,
                start: self.region_start,
                end: self.region_end,
            }));
        }
        self.last = None;
        self.search_from(offset)
    }

    /// Start offset of a group in the last match; `None` if the group did
    /// not participate.
    pub fn start(&self, group: impl GroupRef) -> Result<Option<usize>, Error> {
        let index = self.resolve(group)?;
        Ok(self.ovector()?[index].map(|(s, _)| s))
    }

    /// End offset of a group in the last match.
    pub fn end(&self, group: impl GroupRef) -> Result<Option<usize>, Error> {
        let index = self.resolve(group)?;
        Ok(self.ovector()?[index].map(|(_, e)| e))
    }

    /// Text captured by a group in the last match, in its original form
    /// (never the NFD form, even under `CANON_EQ`).
    pub fn group(&self, group: impl GroupRef) -> Result<Option<U16String>, Error> {
        let index = self.resolve(group)?;
        Ok(self.ovector()?[index].map(|(s, e)| seg(&self.subject, s, e).to_ustring()))
    }

    /// Number of capturing groups, excluding the whole-match group 0.
    /// Available in any state.
    pub fn group_count(&self) -> usize {
        self.pattern.group_count()
    }

    /// Mapping from group name to its 1-based number.
    pub fn named_groups(&self) -> &HashMap<String, usize> {
        self.pattern.named_groups()
    }

    /// Freezes the current state into an immutable [`MatchResult`].
    pub fn to_match_result(&self) -> MatchResult {
        MatchResult::capture(self)
    }

    /// Lazily yields a snapshot for every remaining match, advancing this
    /// matcher as it goes.
    pub fn results(&mut self) -> Results<'_> {
        Results { matcher: self, done: false }
    }

    pub(crate) fn last_range(&self) -> Option<(usize, usize)> {
        self.last.as_ref().and_then(|o| o[0])
    }

    fn resolve(&self, group: impl GroupRef) -> Result<usize, Error> {
        group.resolve(self.pattern.group_count(), self.pattern.named_groups())
    }

    fn ovector(&self) -> Result<&Ovector, Error> {
        self.last.as_ref().ok_or_else(Error::no_match)
    }

    /// Runs one PCRE2 call over the given search-form slice. Returned byte
    /// offsets are absolute within the whole search form.
    fn run(
        &mut self,
        code: &Code,
        slice: (usize, usize),
        at: usize,
        options: u32,
    ) -> Result<Exec, Error> {
        let (start_cu, end_cu) = slice;
        let slice_start = self.map.cu_to_byte(start_cu);
        let slice_end = self.map.cu_to_byte(end_cu);
        let start = self.map.cu_to_byte(at) - slice_start;
        let group_count = self.pattern.group_count();
        let subject = &self.map.utf8()[slice_start..slice_end];
        let result = exec::exec(
            code,
            &mut self.match_data,
            &mut self.match_ctx,
            subject,
            start,
            options,
            group_count,
        )?;
        Ok(match result {
            Exec::Match(ovector) => Exec::Match(
                ovector
                    .into_iter()
                    .map(|pair| pair.map(|(s, e)| (slice_start + s, slice_start + e)))
                    .collect(),
            ),
            Exec::NoMatch { hit_end } => Exec::NoMatch {
                // end contact only counts against the real subject end
                hit_end: hit_end && end_cu == self.map.search_len(),
            },
        })
    }

    /// Maps an absolute byte ovector back to host coordinates.
    fn to_host(&self, ovector: exec::ByteOvector) -> Ovector {
        ovector
            .into_iter()
            .map(|pair| {
                pair.map(|(s, e)| {
                    let s_cu = self.map.byte_to_cu(s);
                    let e_cu = self.map.byte_to_cu(e);
                    (self.map.start_to_host(s_cu), self.map.end_to_host(e_cu))
                })
            })
            .collect()
    }

    fn anchored_op(&mut self, require_full: bool) -> Result<bool, Error> {
        let inner = Arc::clone(&self.pattern.inner);
        let len = self.subject.len();
        let (region_start, region_end) = (self.region_start, self.region_end);
        let pol = policy(
            if require_full { Op::Matches } else { Op::LookingAt },
            self.map.to_search(region_start),
            self.map.to_search(region_end),
            self.map.search_len(),
            self.anchoring_bounds,
            self.transparent_bounds,
            inner.anchors().has_region_anchors,
        );
        let (code, extra) = if pol.rewrite {
            let extra = PCRE2_ANCHORED | if require_full { PCRE2_ENDANCHORED } else { 0 };
            (inner.rewritten_code()?, extra)
        } else if require_full {
            (inner.matches_code()?, 0)
        } else {
            (inner.looking_at_code()?, 0)
        };

        let at = self.map.to_search(region_start);
        let outcome = self.run(code, (pol.slice_start, pol.slice_end), at, pol.options | extra)?;

        let mut hit = false;
        let found = match outcome {
            Exec::NoMatch { hit_end } => {
                hit = hit_end;
                None
            }
            Exec::Match(ovector) => {
                let host = self.to_host(ovector);
                match host[0] {
                    // a deleted `$` still demands "end at the region end"
                    Some((_, end))
                        if !require_full
                            && pol.rewrite
                            && inner.anchors().removed_dollar
                            && end != region_end =>
                    {
                        None
                    }
                    Some(_) => Some(host),
                    None => None,
                }
            }
        };

        Ok(self.commit(found, hit, len, &inner))
    }

    fn search_from(&mut self, from: usize) -> Result<bool, Error> {
        let inner = Arc::clone(&self.pattern.inner);
        let len = self.subject.len();
        let region_end = self.region_end;
        let prev_end = self.last.as_ref().and_then(|o| o[0]).map(|(_, e)| e);
        let pol = policy(
            Op::Find,
            self.map.to_search(self.region_start),
            self.map.to_search(region_end),
            self.map.search_len(),
            self.anchoring_bounds,
            self.transparent_bounds,
            inner.anchors().has_region_anchors,
        );

        let mut hit = false;
        let mut found: Option<Ovector> = None;

        if pol.rewrite {
            // Region-relative anchors: the rewritten `\G` pins each attempt
            // to its own start offset, so every candidate position gets one
            // attempt until something ends where the region demands.
            let code = inner.rewritten_code()?;
            let mut candidate = from;
            while candidate <= region_end {
                let at = self.map.to_search(candidate);
                match self.run(code, (pol.slice_start, pol.slice_end), at, pol.options)? {
                    Exec::NoMatch { hit_end } => hit |= hit_end,
                    Exec::Match(ovector) => {
                        let host = self.to_host(ovector);
                        if let Some((start, end)) = host[0] {
                            let end_ok = if inner.anchors().removed_dollar {
                                end == region_end
                            } else {
                                end <= region_end
                            };
                            let fresh = !(start == end && Some(end) == prev_end);
                            if end_ok && fresh {
                                found = Some(host);
                                break;
                            }
                        }
                    }
                }
                candidate = advance(&self.subject, candidate);
            }
        }

        if found.is_none() {
            found = self.plain_find(&inner, &pol, from, prev_end, &mut hit)?;
        }

        let matched = self.commit(found, hit || region_end == len, len, &inner);
        Ok(matched)
    }

    /// The ordinary find loop: run the find code, trim transparent
    /// overruns, and skip a zero-width match that sits exactly at the end
    /// of the previous one.
    fn plain_find(
        &mut self,
        inner: &Arc<Inner>,
        pol: &Policy,
        mut at: usize,
        prev_end: Option<usize>,
        hit: &mut bool,
    ) -> Result<Option<Ovector>, Error> {
        let region_end = self.region_end;
        let mut slice_end = pol.slice_end;
        loop {
            if at > region_end {
                return Ok(None);
            }
            let at_search = self.map.to_search(at);
            match self.run(inner.find_code(), (pol.slice_start, slice_end), at_search, pol.options)? {
                Exec::NoMatch { hit_end } => {
                    *hit |= hit_end;
                    return Ok(None);
                }
                Exec::Match(ovector) => {
                    let host = self.to_host(ovector);
                    let Some((start, end)) = host[0] else { return Ok(None) };
                    if start > region_end {
                        return Ok(None);
                    }
                    if end > region_end {
                        // only possible with transparent bounds: retry with
                        // the subject cut off at the region end
                        slice_end = self.map.to_search(region_end);
                        continue;
                    }
                    if start == end && Some(end) == prev_end {
                        at = advance(&self.subject, at);
                        continue;
                    }
                    return Ok(Some(host));
                }
            }
        }
    }

    /// Records the outcome of one public search operation: the last match,
    /// and the `hit_end`/`require_end` latches (recomputed per operation,
    /// surviving reset).
    fn commit(&mut self, found: Option<Ovector>, hit: bool, len: usize, inner: &Arc<Inner>) -> bool {
        match found {
            Some(host) => {
                let end = host[0].map(|(_, e)| e).unwrap_or(0);
                self.hit_end = end == len;
                self.require_end = end == len && inner.anchors().require_end_tail;
                self.last = Some(host);
                true
            }
            None => {
                self.hit_end = hit;
                self.require_end = false;
                self.last = None;
                false
            }
        }
    }
}

fn configure_context(pattern: &Pattern) -> MatchContext {
    let mut ctx = MatchContext::new();
    let limits = pattern.inner.limits();
    if let Some(limit) = limits.match_limit {
        ctx.set_match_limit(limit);
    }
    if let Some(limit) = limits.depth_limit {
        ctx.set_depth_limit(limit);
    }
    if let Some(limit) = limits.heap_limit {
        ctx.set_heap_limit(limit);
    }
    ctx
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Matcher[pattern={} region={},{} lastMatchIndices=",
            self.pattern.pattern(),
            self.region_start,
            self.region_end
        )?;
        match self.last_range() {
            Some((start, end)) => write!(f, "[{}, {}]", start, end)?,
            None => f.write_str("null")?,
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("pattern", &self.pattern.pattern())
            .field("region", &(self.region_start..self.region_end))
            .field("last", &self.last_range())
            .finish()
    }
}

/// Iterator returned by [`Matcher::results`].
pub struct Results<'m> {
    matcher: &'m mut Matcher,
    done: bool,
}

impl Iterator for Results<'_> {
    type Item = Result<MatchResult, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.matcher.find() {
            Ok(true) => Some(Ok(self.matcher.to_match_result())),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
