/*!
Index maps between the three coordinate spaces a search touches: the host
UTF-16 code units the caller sees, the UTF-8 bytes PCRE2 sees, and, under
canonical equivalence, the NFD code units the search actually runs over.
*/

use std::char;
use std::iter::once;

use unicode_normalization::UnicodeNormalization;
use widestring::U16Str;

/// Per-subject coordinate maps, rebuilt whenever the subject changes.
///
/// The "search form" is the text matching runs over: the subject itself,
/// or its NFD when canonical equivalence is enabled. All map queries are
/// O(1) except `end_to_host`, which binary-searches the prefix sums.
pub(crate) struct SubjectMap {
    utf8: Vec<u8>,
    /// Byte offset of every search-form code-unit boundary; interior
    /// surrogate boundaries carry the byte offset of their code point.
    cu_to_byte: Vec<usize>,
    /// Least code-unit index for every byte offset of the search form.
    byte_to_cu: Vec<usize>,
    nfd: Option<NfdMap>,
}

struct NfdMap {
    /// `orig_to_nfd[i]` = UTF-16 length of NFD(subject[0..i]).
    orig_to_nfd: Vec<usize>,
    /// `nfd_to_orig[j]` = smallest host index whose NFD expansion covers
    /// NFD index `j`.
    nfd_to_orig: Vec<usize>,
}

/// Decodes UTF-16 into `(code point, code units consumed)` pairs. An
/// unpaired surrogate consumes one unit and decodes to U+FFFD.
fn code_points(text: &U16Str) -> Vec<(char, usize)> {
    char::decode_utf16(text.as_slice().iter().copied())
        .map(|r| match r {
            Ok(c) => (c, c.len_utf16()),
            Err(_) => (char::REPLACEMENT_CHARACTER, 1),
        })
        .collect()
}

/// Encodes code points to UTF-8 and records both boundary maps.
fn encode(points: &[(char, usize)]) -> (Vec<u8>, Vec<usize>, Vec<usize>) {
    let mut utf8 = Vec::with_capacity(points.len() * 2);
    let mut cu_to_byte = Vec::new();
    let mut byte_to_cu = Vec::new();
    let mut cu = 0;
    for &(c, consumed) in points {
        let start = utf8.len();
        let mut buf = [0u8; 4];
        utf8.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        for _ in 0..consumed {
            cu_to_byte.push(start);
        }
        for _ in start..utf8.len() {
            byte_to_cu.push(cu);
        }
        cu += consumed;
    }
    cu_to_byte.push(utf8.len());
    byte_to_cu.push(cu);
    (utf8, cu_to_byte, byte_to_cu)
}

impl SubjectMap {
    pub(crate) fn build(subject: &U16Str, canon_eq: bool) -> SubjectMap {
        let points = code_points(subject);
        if !canon_eq {
            let (utf8, cu_to_byte, byte_to_cu) = encode(&points);
            return SubjectMap { utf8, cu_to_byte, byte_to_cu, nfd: None };
        }

        // Decomposition lengths are per code point, so the prefix sums are
        // exact even though canonical reordering may permute combining
        // marks across code point boundaries.
        let mut orig_to_nfd = Vec::with_capacity(subject.len() + 1);
        let mut nfd_to_orig = Vec::new();
        let mut nfd_len = 0;
        let mut orig_cu = 0;
        for &(c, consumed) in &points {
            let expansion: usize = once(c).nfd().map(|d| d.len_utf16()).sum();
            for _ in 0..consumed {
                orig_to_nfd.push(nfd_len);
            }
            for _ in 0..expansion {
                nfd_to_orig.push(orig_cu);
            }
            nfd_len += expansion;
            orig_cu += consumed;
        }
        orig_to_nfd.push(nfd_len);
        nfd_to_orig.push(orig_cu);

        // The search text itself needs the whole-string pass so that
        // combining marks end up in canonical order.
        let nfd_points: Vec<(char, usize)> = points
            .iter()
            .map(|&(c, _)| c)
            .nfd()
            .map(|c| (c, c.len_utf16()))
            .collect();
        debug_assert_eq!(nfd_points.iter().map(|p| p.1).sum::<usize>(), nfd_len);

        let (utf8, cu_to_byte, byte_to_cu) = encode(&nfd_points);
        SubjectMap {
            utf8,
            cu_to_byte,
            byte_to_cu,
            nfd: Some(NfdMap { orig_to_nfd, nfd_to_orig }),
        }
    }

    /// The UTF-8 encoding of the search form.
    pub(crate) fn utf8(&self) -> &[u8] {
        &self.utf8
    }

    /// Length of the search form in UTF-16 code units.
    pub(crate) fn search_len(&self) -> usize {
        self.cu_to_byte.len() - 1
    }

    pub(crate) fn cu_to_byte(&self, cu: usize) -> usize {
        self.cu_to_byte[cu]
    }

    pub(crate) fn byte_to_cu(&self, byte: usize) -> usize {
        self.byte_to_cu[byte]
    }

    /// Host code-unit index to search-form index.
    pub(crate) fn to_search(&self, host: usize) -> usize {
        match &self.nfd {
            Some(map) => map.orig_to_nfd[host],
            None => host,
        }
    }

    /// Search-form start offset back to the host index that covers it.
    pub(crate) fn start_to_host(&self, search: usize) -> usize {
        match &self.nfd {
            Some(map) => map.nfd_to_orig[search],
            None => search,
        }
    }

    /// Search-form end offset back to the smallest host index `k` with
    /// `NFD(subject[0..k])` at least `search` units long.
    pub(crate) fn end_to_host(&self, search: usize) -> usize {
        match &self.nfd {
            Some(map) => map.orig_to_nfd.partition_point(|&v| v < search),
            None => search,
        }
    }
}

#[cfg(test)]
mod tests {
    use widestring::u16str;

    use super::*;

    #[test]
    fn ascii_is_identity() {
        let map = SubjectMap::build(u16str!("abc"), false);
        assert_eq!(map.utf8(), b"abc");
        assert_eq!(map.search_len(), 3);
        for i in 0..=3 {
            assert_eq!(map.cu_to_byte(i), i);
            assert_eq!(map.byte_to_cu(i), i);
            assert_eq!(map.to_search(i), i);
        }
    }

    #[test]
    fn surrogate_pair_collapses_to_one_code_point() {
        // '𝄞' is two code units and four UTF-8 bytes.
        let map = SubjectMap::build(u16str!("a𝄞b"), false);
        assert_eq!(map.search_len(), 4);
        assert_eq!(map.cu_to_byte(0), 0);
        assert_eq!(map.cu_to_byte(1), 1);
        assert_eq!(map.cu_to_byte(3), 5);
        assert_eq!(map.cu_to_byte(4), 6);
        assert_eq!(map.byte_to_cu(1), 1);
        assert_eq!(map.byte_to_cu(5), 3);
        assert_eq!(map.byte_to_cu(6), 4);
    }

    #[test]
    fn unpaired_surrogate_becomes_replacement() {
        let units = [0x0061u16, 0xD834, 0x0062];
        let map = SubjectMap::build(U16Str::from_slice(&units), false);
        assert_eq!(map.search_len(), 3);
        // U+FFFD is three UTF-8 bytes but still one consumed code unit.
        assert_eq!(map.cu_to_byte(2), 4);
        assert_eq!(map.utf8().len(), 5);
    }

    #[test]
    fn nfd_maps_for_combining_sequence() {
        // "e" + COMBINING ACUTE is already in NFD form.
        let map = SubjectMap::build(u16str!("e\u{301}x"), true);
        assert_eq!(map.search_len(), 3);
        assert_eq!(map.to_search(0), 0);
        assert_eq!(map.to_search(1), 1);
        assert_eq!(map.start_to_host(0), 0);
        assert_eq!(map.end_to_host(2), 2);
    }

    #[test]
    fn nfd_maps_for_precomposed() {
        // "é" is one host unit that decomposes to two NFD units.
        let map = SubjectMap::build(u16str!("éx"), true);
        assert_eq!(map.search_len(), 3);
        assert_eq!(map.to_search(1), 2);
        assert_eq!(map.start_to_host(0), 0);
        assert_eq!(map.start_to_host(2), 1);
        // Anything ending inside the expansion still covers the host char.
        assert_eq!(map.end_to_host(1), 1);
        assert_eq!(map.end_to_host(2), 1);
        assert_eq!(map.end_to_host(3), 2);
    }

    #[test]
    fn multi_mark_decomposition() {
        // U+1EC7 (ê with dot below) decomposes to e + U+0323 + U+0302.
        let map = SubjectMap::build(u16str!("\u{1EC7}"), true);
        assert_eq!(map.search_len(), 3);
        assert_eq!(map.to_search(1), 3);
        assert_eq!(map.end_to_host(3), 1);
        assert_eq!(map.start_to_host(2), 0);
    }
}
