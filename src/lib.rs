/*!
A `Pattern`/`Matcher` style regular-expression facade over PCRE2: compile
once, search many, with capture groups, match regions, replacement and
split support.

## Features
- Full PCRE2 syntax, executed by PCRE2 itself; this crate only adapts.
- UTF-16 subjects: every public offset is a UTF-16 code-unit index, with
  the UTF-8 byte offsets PCRE2 reports translated both ways (surrogate
  pairs included).
- Canonical equivalence ([`Flags::CANON_EQ`]): matching runs over the NFD
  form of both pattern and subject while all reported offsets and captured
  text stay in the subject's original form.
- Match regions with anchoring and transparent bounds, synthesized from
  subject slicing, `NOTBOL`/`NOTEOL`, and a `^`→`\G` pattern rewrite —
  PCRE2 has no native region support.
- ReDoS protection via match/depth/heap budgets that abort with a typed
  error instead of running away.

## Usage
```
use pcre2_matcher::Pattern;

let pattern = Pattern::compile(r"(\w+)@(\w+\.\w+)")?;
let mut m = pattern.matcher("user@example.com");
assert!(m.find()?);
assert_eq!(m.group(1)?.unwrap().to_string_lossy(), "user");
assert_eq!(m.group(2)?.unwrap().to_string_lossy(), "example.com");

let mut m = Pattern::compile(r"(\w+) (\w+)")?.matcher("hello world");
assert_eq!(m.replace_all("$2 $1")?.to_string_lossy(), "world hello");
# Ok::<(), pcre2_matcher::Error>(())
```

Regions bound where matches may start and end; transparent bounds let
lookarounds see past them:
```
use pcre2_matcher::Pattern;

let mut m = Pattern::compile(r"(?<=foo)bar")?.matcher("foobarXXX");
m.region(3, 9)?.use_transparent_bounds(true);
assert!(m.find()?);
# Ok::<(), pcre2_matcher::Error>(())
```

## Sharing
A [`Pattern`] is immutable and freely shareable across threads; a
[`Matcher`] is mutable per-search state owned by one thread at a time.

## Configuration
Process-wide defaults, read when a pattern is compiled and overridden by
[`Pattern::builder`] values: `PCRE2_MATCHER_JIT` (set to `false` to force
the interpreter), `PCRE2_MATCHER_MATCH_LIMIT`,
`PCRE2_MATCHER_DEPTH_LIMIT` and `PCRE2_MATCHER_HEAP_LIMIT` (the latter
two only bind in the interpreter and therefore disable the JIT).

## Known divergences
- `UNICODE_CASE` is a no-op: UTF mode always case-folds with full Unicode
  rules, so `(?i)k` matches the Kelvin sign even without the flag.
- `require_end` reports `false` for a `\z`-anchored tail.
*/

mod error;
mod ffi;
pub mod matcher;
pub mod pattern;
mod subject;

pub use crate::error::{Error, ErrorKind, LimitKind};
pub use crate::matcher::{GroupRef, MatchResult, Matcher, Results};
pub use crate::pattern::{Flags, Pattern, Split};
pub use crate::subject::IntoSubject;

pub use widestring;
pub use widestring::{U16Str, U16String};

mod private {
    pub trait Sealed {}
}

#[cfg(test)]
mod tests {
    use widestring::u16str;

    use crate::{Flags, Matcher, Pattern};

    #[test]
    fn email_capture() {
        let mut m = Pattern::compile(r"(\w+)@(\w+\.\w+)")
            .unwrap()
            .matcher("user@example.com");
        assert!(m.find().unwrap());
        assert_eq!(m.group(1).unwrap(), Some(u16str!("user").to_ustring()));
        assert_eq!(m.group(2).unwrap(), Some(u16str!("example.com").to_ustring()));
    }

    #[test]
    fn replacement_swaps_words() {
        let mut m = Pattern::compile(r"(\w+) (\w+)").unwrap().matcher("hello world");
        assert_eq!(m.replace_all("$2 $1").unwrap(), u16str!("world hello").to_ustring());
    }

    #[test]
    fn canonical_equivalence_end_to_end() {
        let pattern = Pattern::compile_with("\u{00E9}", Flags::CANON_EQ).unwrap();
        let mut m = pattern.matcher("e\u{301}");
        assert!(m.matches().unwrap());
        assert_eq!((m.start(0).unwrap(), m.end(0).unwrap()), (Some(0), Some(2)));
    }

    #[test]
    fn quote_round_trips_arbitrary_text() {
        for s in ["a.b*c", "[](){}", "\\Qalready\\E", "^anchor$", "plain"] {
            let pattern = Pattern::compile(&Pattern::quote(s)).unwrap();
            assert!(pattern.matcher(s).matches().unwrap(), "quote failed for {:?}", s);
        }
    }

    #[test]
    fn quote_replacement_round_trips_arbitrary_text() {
        for s in ["plain", "$1", "\\", "a$b\\c$"] {
            let result = Pattern::compile("x")
                .unwrap()
                .matcher("x")
                .replace_all(&Matcher::quote_replacement(s))
                .unwrap();
            assert_eq!(result.to_string_lossy(), s);
        }
    }

    #[test]
    fn find_is_monotone() {
        let mut m = Pattern::compile("a*").unwrap().matcher("aabaa");
        let mut previous: Option<(usize, usize)> = None;
        while m.find().unwrap() {
            let span = (m.start(0).unwrap().unwrap(), m.end(0).unwrap().unwrap());
            if let Some((prev_start, _)) = previous {
                assert!(span.1 >= prev_start + 1);
            }
            previous = Some(span);
        }
        assert!(previous.is_some());
    }

    #[test]
    fn results_count_matches_finds() {
        let pattern = Pattern::compile(r"\d").unwrap();
        let count = pattern.matcher("a1b2c3").results().count();
        let mut m = pattern.matcher("a1b2c3");
        let mut finds = 0;
        while m.find().unwrap() {
            finds += 1;
        }
        assert_eq!(count, finds);
    }
}
