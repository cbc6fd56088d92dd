/*!
Scoped wrappers around the raw `pcre2-sys` bindings.

Every PCRE2 object used by this crate is owned by exactly one of the types
below and released in `Drop`, so native resources survive no longer than
their Rust owner on any exit path. Nothing in here knows about regions,
coordinates or the public API; this module only turns raw pointers and
return codes into safe calls.
*/

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

use pcre2_sys::*;

use crate::error::{Error, ErrorKind, LimitKind};

/// Renders a PCRE2 error code into its textual message.
pub(crate) fn error_message(code: c_int) -> String {
    let mut buf = [0u8; 512];
    let rc = unsafe {
        pcre2_get_error_message_8(code, buf.as_mut_ptr(), buf.len())
    };
    if rc < 0 {
        return format!("unknown PCRE2 error ({})", code);
    }
    String::from_utf8_lossy(&buf[..rc as usize]).into_owned()
}

/// Returns true if this build of PCRE2 supports JIT compilation.
pub(crate) fn jit_available() -> bool {
    let mut rc: u32 = 0;
    unsafe {
        pcre2_config_8(PCRE2_CONFIG_JIT, &mut rc as *mut u32 as *mut c_void);
    }
    rc == 1
}

/// Classifies a negative `pcre2_match` return code.
pub(crate) fn match_error(code: c_int) -> Error {
    let kind = match code {
        PCRE2_ERROR_MATCHLIMIT => ErrorKind::Limit { limit: LimitKind::Match, code },
        PCRE2_ERROR_DEPTHLIMIT => ErrorKind::Limit { limit: LimitKind::Depth, code },
        PCRE2_ERROR_HEAPLIMIT => ErrorKind::Limit { limit: LimitKind::Heap, code },
        _ => ErrorKind::Engine { code },
    };
    Error::new(kind)
}

/// A compile context. Only used to pick the newline convention.
pub(crate) struct CompileContext(*mut pcre2_compile_context_8);

impl CompileContext {
    pub(crate) fn new() -> CompileContext {
        let ctx = unsafe { pcre2_compile_context_create_8(ptr::null_mut()) };
        assert!(!ctx.is_null(), "could not allocate compile context");
        CompileContext(ctx)
    }

    pub(crate) fn set_newline(&mut self, newline: u32) {
        let rc = unsafe { pcre2_set_newline_8(self.0, newline) };
        assert_eq!(rc, 0, "invalid newline convention");
    }

    fn as_mut_ptr(&mut self) -> *mut pcre2_compile_context_8 {
        self.0
    }
}

impl Drop for CompileContext {
    fn drop(&mut self) {
        unsafe { pcre2_compile_context_free_8(self.0) }
    }
}

/// A compiled PCRE2 pattern.
///
/// Once built, the underlying code object is only ever read, which is what
/// makes sharing a pattern across threads sound.
#[derive(Debug)]
pub(crate) struct Code {
    code: *mut pcre2_code_8,
}

// The compiled code block is immutable after construction and PCRE2
// documents concurrent matching on a single code object as supported.
unsafe impl Send for Code {}
unsafe impl Sync for Code {}

impl Code {
    /// Compiles `pattern` (UTF-8) with the given option bits.
    pub(crate) fn new(
        pattern: &str,
        options: u32,
        mut ctx: CompileContext,
    ) -> Result<Code, Error> {
        let mut error_code: c_int = 0;
        let mut error_offset: usize = 0;
        let code = unsafe {
            pcre2_compile_8(
                pattern.as_ptr(),
                pattern.len(),
                options,
                &mut error_code,
                &mut error_offset,
                ctx.as_mut_ptr(),
            )
        };
        if code.is_null() {
            Err(Error::compile(error_message(error_code), error_offset))
        } else {
            Ok(Code { code })
        }
    }

    /// JIT-compiles this code for complete matching.
    pub(crate) fn jit_compile(&mut self) -> Result<(), Error> {
        let rc = unsafe { pcre2_jit_compile_8(self.code, PCRE2_JIT_COMPLETE) };
        if rc == 0 {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Engine { code: rc }))
        }
    }

    pub(crate) fn as_ptr(&self) -> *const pcre2_code_8 {
        self.code
    }

    fn info_u32(&self, what: u32) -> Result<u32, Error> {
        let mut out: u32 = 0;
        let rc = unsafe {
            pcre2_pattern_info_8(self.code, what, &mut out as *mut u32 as *mut c_void)
        };
        if rc != 0 {
            return Err(Error::new(ErrorKind::Engine { code: rc }));
        }
        Ok(out)
    }

    /// Number of capturing groups, excluding the whole-match group 0.
    pub(crate) fn capture_count(&self) -> Result<usize, Error> {
        Ok(self.info_u32(PCRE2_INFO_CAPTURECOUNT)? as usize)
    }

    /// Named-group table as `(name, 1-based group number)` pairs.
    ///
    /// Each PCRE2 name-table entry is a big-endian 16-bit group number
    /// followed by the NUL-terminated name.
    pub(crate) fn name_table(&self) -> Result<Vec<(String, usize)>, Error> {
        let count = self.info_u32(PCRE2_INFO_NAMECOUNT)? as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let entry_size = self.info_u32(PCRE2_INFO_NAMEENTRYSIZE)? as usize;
        let mut table: PCRE2_SPTR8 = ptr::null();
        let rc = unsafe {
            pcre2_pattern_info_8(
                self.code,
                PCRE2_INFO_NAMETABLE,
                &mut table as *mut PCRE2_SPTR8 as *mut c_void,
            )
        };
        if rc != 0 {
            return Err(Error::new(ErrorKind::Engine { code: rc }));
        }
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let entry = unsafe { table.add(i * entry_size) };
            let number = unsafe {
                ((ptr::read(entry) as usize) << 8) | ptr::read(entry.add(1)) as usize
            };
            let mut len = 0;
            while unsafe { ptr::read(entry.add(2 + len)) } != 0 {
                len += 1;
            }
            let bytes = unsafe { std::slice::from_raw_parts(entry.add(2), len) };
            names.push((String::from_utf8_lossy(bytes).into_owned(), number));
        }
        Ok(names)
    }
}

impl Drop for Code {
    fn drop(&mut self) {
        unsafe { pcre2_code_free_8(self.code) }
    }
}

/// A match context carrying the configured resource budgets.
pub(crate) struct MatchContext(*mut pcre2_match_context_8);

unsafe impl Send for MatchContext {}

impl MatchContext {
    pub(crate) fn new() -> MatchContext {
        let ctx = unsafe { pcre2_match_context_create_8(ptr::null_mut()) };
        assert!(!ctx.is_null(), "could not allocate match context");
        MatchContext(ctx)
    }

    pub(crate) fn set_match_limit(&mut self, limit: u32) {
        unsafe { pcre2_set_match_limit_8(self.0, limit) };
    }

    pub(crate) fn set_depth_limit(&mut self, limit: u32) {
        unsafe { pcre2_set_depth_limit_8(self.0, limit) };
    }

    pub(crate) fn set_heap_limit(&mut self, limit: u32) {
        unsafe { pcre2_set_heap_limit_8(self.0, limit) };
    }

    fn as_mut_ptr(&mut self) -> *mut pcre2_match_context_8 {
        self.0
    }
}

impl Drop for MatchContext {
    fn drop(&mut self) {
        unsafe { pcre2_match_context_free_8(self.0) }
    }
}

/// Scratch space for one match call, reused across calls.
pub(crate) struct MatchData {
    data: *mut pcre2_match_data_8,
    ovector_ptr: *const usize,
    ovector_count: usize,
}

unsafe impl Send for MatchData {}

impl MatchData {
    /// Allocates match data sized to the given code's ovector count.
    pub(crate) fn new(code: &Code) -> MatchData {
        let data = unsafe {
            pcre2_match_data_create_from_pattern_8(code.as_ptr(), ptr::null_mut())
        };
        assert!(!data.is_null(), "could not allocate match data");
        let ovector_ptr = unsafe { pcre2_get_ovector_pointer_8(data) };
        assert!(!ovector_ptr.is_null(), "got NULL ovector pointer");
        let ovector_count = unsafe { pcre2_get_ovector_count_8(data) } as usize;
        MatchData { data, ovector_ptr, ovector_count }
    }

    /// Runs `pcre2_match` and returns the raw return code: the number of
    /// ovector pairs set on success, negative on no-match or error.
    pub(crate) fn raw_match(
        &mut self,
        code: &Code,
        subject: &[u8],
        start: usize,
        options: u32,
        ctx: &mut MatchContext,
    ) -> c_int {
        assert!(start <= subject.len());
        unsafe {
            pcre2_match_8(
                code.as_ptr(),
                subject.as_ptr(),
                subject.len(),
                start,
                options,
                self.data,
                ctx.as_mut_ptr(),
            )
        }
    }

    /// The ovector as `(start, end)` byte pairs. Valid after a successful
    /// `raw_match`; pairs that did not participate hold `PCRE2_UNSET`.
    pub(crate) fn ovector(&self) -> &[usize] {
        unsafe { std::slice::from_raw_parts(self.ovector_ptr, self.ovector_count * 2) }
    }
}

impl Drop for MatchData {
    fn drop(&mut self) {
        unsafe { pcre2_match_data_free_8(self.data) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_match() {
        let code = Code::new("a(b)c", PCRE2_UTF, CompileContext::new()).unwrap();
        assert_eq!(code.capture_count().unwrap(), 1);
        let mut data = MatchData::new(&code);
        let mut ctx = MatchContext::new();
        let rc = data.raw_match(&code, b"zabc", 0, 0, &mut ctx);
        assert_eq!(rc, 2);
        assert_eq!(&data.ovector()[..4], &[1, 4, 2, 3]);
    }

    #[test]
    fn compile_error_carries_offset() {
        let err = Code::new("a(b", PCRE2_UTF, CompileContext::new()).unwrap_err();
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn name_table() {
        let code =
            Code::new("(?<first>a)(?<second>b)", PCRE2_UTF, CompileContext::new()).unwrap();
        let mut names = code.name_table().unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![("first".to_string(), 1), ("second".to_string(), 2)]
        );
    }

    #[test]
    fn no_match_is_negative() {
        let code = Code::new("x", PCRE2_UTF, CompileContext::new()).unwrap();
        let mut data = MatchData::new(&code);
        let mut ctx = MatchContext::new();
        assert_eq!(data.raw_match(&code, b"abc", 0, 0, &mut ctx), PCRE2_ERROR_NOMATCH);
    }
}
