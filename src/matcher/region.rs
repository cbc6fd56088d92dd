/*!
Region policy: for one search operation, which slice of the subject PCRE2
gets to see, which match-time option bits are set, and whether the
rewritten-anchor code is needed. All offsets here are in search-form code
units (the caller converts host coordinates first).
*/

use pcre2_sys::{PCRE2_NOTBOL, PCRE2_NOTEOL};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Op {
    Find,
    Matches,
    LookingAt,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Policy {
    pub(crate) slice_start: usize,
    pub(crate) slice_end: usize,
    pub(crate) options: u32,
    pub(crate) rewrite: bool,
}

pub(crate) fn policy(
    op: Op,
    region_start: usize,
    region_end: usize,
    subject_len: usize,
    anchoring: bool,
    transparent: bool,
    has_region_anchors: bool,
) -> Policy {
    if transparent {
        // Lookarounds and \b get to see past the region. The anchored entry
        // points are clamped at the region end so that "consume the whole
        // region" stays expressible with ENDANCHORED; find keeps the full
        // subject and the matcher trims overruns itself.
        let slice_end = match op {
            Op::Find => subject_len,
            Op::Matches | Op::LookingAt => region_end,
        };
        Policy {
            slice_start: 0,
            slice_end,
            options: 0,
            rewrite: anchoring && has_region_anchors,
        }
    } else {
        // Opaque bounds: the region is the whole world. With anchoring
        // bounds on, ^/$ match at the slice edges for free; with them off,
        // PCRE2 is told when an edge is not a real text boundary.
        let mut options = 0;
        if !anchoring {
            if region_start > 0 {
                options |= PCRE2_NOTBOL;
            }
            if region_end < subject_len {
                options |= PCRE2_NOTEOL;
            }
        }
        Policy {
            slice_start: region_start,
            slice_end: region_end,
            options,
            rewrite: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds_slice_the_region() {
        let p = policy(Op::Find, 3, 7, 10, true, false, true);
        assert_eq!((p.slice_start, p.slice_end), (3, 7));
        assert_eq!(p.options, 0);
        assert!(!p.rewrite);
    }

    #[test]
    fn anchoring_off_sets_not_bol_eol() {
        let p = policy(Op::Find, 3, 7, 10, false, false, false);
        assert_eq!(p.options, PCRE2_NOTBOL | PCRE2_NOTEOL);
        let p = policy(Op::Find, 0, 10, 10, false, false, false);
        assert_eq!(p.options, 0);
        let p = policy(Op::Find, 0, 7, 10, false, false, false);
        assert_eq!(p.options, PCRE2_NOTEOL);
    }

    #[test]
    fn transparent_find_sees_the_whole_subject() {
        let p = policy(Op::Find, 3, 7, 10, false, true, false);
        assert_eq!((p.slice_start, p.slice_end), (0, 10));
        assert_eq!(p.options, 0);
        assert!(!p.rewrite);
    }

    #[test]
    fn transparent_anchored_ops_clamp_at_region_end() {
        let p = policy(Op::Matches, 3, 7, 10, true, true, false);
        assert_eq!((p.slice_start, p.slice_end), (0, 7));
        assert!(!p.rewrite);
    }

    #[test]
    fn rewrite_needs_all_three_conditions() {
        assert!(policy(Op::Find, 3, 7, 10, true, true, true).rewrite);
        assert!(!policy(Op::Find, 3, 7, 10, true, true, false).rewrite);
        assert!(!policy(Op::Find, 3, 7, 10, false, true, true).rewrite);
        assert!(!policy(Op::Find, 3, 7, 10, true, false, true).rewrite);
    }
}
