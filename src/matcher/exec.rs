/*!
Single-shot execution of one compiled code against one subject slice.

Everything here speaks UTF-8 byte offsets; translating them back to host
coordinates is the caller's job.
*/

use itertools::Itertools;
use pcre2_sys::{PCRE2_ERROR_NOMATCH, PCRE2_ERROR_PARTIAL, PCRE2_PARTIAL_SOFT, PCRE2_UNSET};

use crate::error::Error;
use crate::ffi::{self, Code, MatchContext, MatchData};

/// Byte-offset ovector: one `(start, end)` pair per group, `None` for
/// groups that did not participate in the match.
pub(crate) type ByteOvector = Vec<Option<(usize, usize)>>;

#[derive(Debug)]
pub(crate) enum Exec {
    Match(ByteOvector),
    NoMatch {
        /// A `PCRE2_PARTIAL_SOFT` re-run found a partial match, i.e. the
        /// attempt consumed input up to the end of the slice.
        hit_end: bool,
    },
}

pub(crate) fn exec(
    code: &Code,
    data: &mut MatchData,
    ctx: &mut MatchContext,
    subject: &[u8],
    start: usize,
    options: u32,
    group_count: usize,
) -> Result<Exec, Error> {
    let rc = data.raw_match(code, subject, start, options, ctx);
    if rc == PCRE2_ERROR_NOMATCH {
        let probe = data.raw_match(code, subject, start, options | PCRE2_PARTIAL_SOFT, ctx);
        return Ok(Exec::NoMatch { hit_end: probe == PCRE2_ERROR_PARTIAL });
    }
    if rc < 0 {
        return Err(ffi::match_error(rc));
    }
    // rc is the number of ovector pairs set; 0 would mean the ovector was
    // too small, which cannot happen with match data created from the
    // pattern itself.
    let pairs = rc as usize;
    let ovector = data
        .ovector()
        .iter()
        .copied()
        .tuples()
        .take(group_count + 1)
        .enumerate()
        .map(|(i, (s, e))| {
            if (pairs != 0 && i >= pairs) || s == PCRE2_UNSET {
                None
            } else {
                Some((s, e))
            }
        })
        .collect();
    Ok(Exec::Match(ovector))
}
