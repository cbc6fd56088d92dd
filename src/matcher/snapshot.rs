use std::collections::HashMap;
use std::sync::Arc;

use widestring::{U16Str, U16String};

use crate::error::Error;
use crate::matcher::{GroupRef, Matcher, Ovector};
use crate::subject::seg;

/// An immutable snapshot of a matcher's state, frozen at
/// [`Matcher::to_match_result`] time.
///
/// The snapshot keeps its own copy of the subject and the ovector, so
/// later searches on the originating matcher never show through. One
/// taken while the matcher held no match reports "no match available"
/// from every positional accessor, just like the matcher itself.
#[derive(Clone, Debug)]
pub struct MatchResult {
    subject: U16String,
    ovector: Option<Ovector>,
    names: Arc<HashMap<String, usize>>,
    group_count: usize,
}

impl MatchResult {
    pub(crate) fn capture(matcher: &Matcher) -> MatchResult {
        MatchResult {
            subject: matcher.subject.clone(),
            ovector: matcher.last.clone(),
            names: Arc::clone(matcher.pattern.inner.names()),
            group_count: matcher.group_count(),
        }
    }

    /// True if this snapshot holds a match.
    pub fn has_match(&self) -> bool {
        self.ovector.is_some()
    }

    /// The subject this snapshot was taken over.
    pub fn subject(&self) -> &U16Str {
        &self.subject
    }

    /// Number of capturing groups, excluding the whole-match group 0.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Mapping from group name to its 1-based group number.
    pub fn named_groups(&self) -> &HashMap<String, usize> {
        &self.names
    }

    /// Start offset of a group; `None` if the group did not participate.
    pub fn start(&self, group: impl GroupRef) -> Result<Option<usize>, Error> {
        let index = group.resolve(self.group_count, &self.names)?;
        Ok(self.ovector()?[index].map(|(s, _)| s))
    }

    /// End offset of a group.
    pub fn end(&self, group: impl GroupRef) -> Result<Option<usize>, Error> {
        let index = group.resolve(self.group_count, &self.names)?;
        Ok(self.ovector()?[index].map(|(_, e)| e))
    }

    /// Text captured by a group, in the subject's original form.
    pub fn group(&self, group: impl GroupRef) -> Result<Option<U16String>, Error> {
        let index = group.resolve(self.group_count, &self.names)?;
        Ok(self.ovector()?[index].map(|(s, e)| seg(&self.subject, s, e).to_ustring()))
    }

    fn ovector(&self) -> Result<&Ovector, Error> {
        self.ovector.as_ref().ok_or_else(Error::no_match)
    }
}

#[cfg(test)]
mod tests {
    use widestring::u16str;

    use crate::error::ErrorKind;
    use crate::Pattern;

    #[test]
    fn snapshot_mirrors_the_matcher() {
        let mut m = Pattern::compile(r"(\w+)=(\w+)").unwrap().matcher("k=v");
        assert!(m.find().unwrap());
        let r = m.to_match_result();
        assert!(r.has_match());
        assert_eq!(r.group_count(), 2);
        assert_eq!(r.start(1).unwrap(), Some(0));
        assert_eq!(r.group(2).unwrap(), Some(u16str!("v").to_ustring()));
    }

    #[test]
    fn matchless_snapshot_errors_on_accessors() {
        let m = Pattern::compile("x").unwrap().matcher("abc");
        let r = m.to_match_result();
        assert!(!r.has_match());
        assert!(matches!(r.start(0).unwrap_err().kind(), ErrorKind::NoMatchAvailable));
        assert!(matches!(r.group(0).unwrap_err().kind(), ErrorKind::NoMatchAvailable));
    }
}
