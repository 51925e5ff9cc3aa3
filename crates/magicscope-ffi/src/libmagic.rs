//! libmagic MIME type and description detection.

use std::cmp::Ordering;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::io;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use magicscope_core::{
    Backend, EngineError, EngineResult, FlagCodec, LibraryVersion, Mask, Param, Session,
};
use once_cell::sync::Lazy;
use tracing::{debug, warn};

const EINVAL: i32 = 22;

/// libmagic release these bindings are written against.
pub const BOUND_VERSION: LibraryVersion = LibraryVersion::new(5, 38);

static LIBRARY_VERSION: Lazy<LibraryVersion> = Lazy::new(|| {
    // SAFETY: magic_version has no preconditions.
    let raw = unsafe { magic_sys::magic_version() };
    let version = LibraryVersion::from_packed(u32::try_from(raw).unwrap_or(0));
    check_version(version);
    version
});

static CODEC: Lazy<FlagCodec> = Lazy::new(|| FlagCodec::for_version(library_version()));

static DEFAULT_DATABASE_PATH: Lazy<Option<PathBuf>> = Lazy::new(|| {
    // SAFETY: a null magicfile with action 0 asks for the default path; the
    // result points into static or environment storage.
    let ptr = unsafe { magic_sys::magic_getpath(std::ptr::null(), 0) };
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null results are NUL-terminated strings.
    let bytes = unsafe { CStr::from_ptr(ptr) }.to_bytes();
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
});

fn version_mismatch(linked: LibraryVersion) -> Option<&'static str> {
    match linked.cmp(&BOUND_VERSION) {
        Ordering::Less => Some("linked libmagic is older than the bindings expect"),
        Ordering::Greater => Some("linked libmagic is newer than the bindings were written against"),
        Ordering::Equal => None,
    }
}

fn check_version(version: LibraryVersion) {
    if std::env::var_os("MAGIC_SILENCE_VERSION_CHECK").is_some() {
        return;
    }
    if let Some(message) = version_mismatch(version) {
        warn!(library = %version, expected = %BOUND_VERSION, "{message}");
    }
}

/// Version of the linked libmagic, read once.
pub fn library_version() -> LibraryVersion {
    *LIBRARY_VERSION
}

/// Database libmagic loads when none is given, if it reports one.
pub fn default_database_path() -> Option<&'static Path> {
    DEFAULT_DATABASE_PATH.as_deref()
}

/// Flag codec for the linked libmagic.
pub fn codec() -> &'static FlagCodec {
    &CODEC
}

fn c_path(path: Option<&Path>) -> EngineResult<Option<CString>> {
    path.map(|p| {
        CString::new(p.as_os_str().as_bytes())
            .map_err(|_| EngineError::new(format!("path contains a NUL byte: {}", p.display())))
    })
    .transpose()
}

fn ptr_or_null(path: &Option<CString>) -> *const c_char {
    path.as_ref().map_or(std::ptr::null(), |p| p.as_ptr())
}

/// The libmagic engine. Stateless; every session is its own cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct Libmagic;

impl Backend for Libmagic {
    type Session = LibmagicSession;

    fn codec(&self) -> &FlagCodec {
        codec()
    }

    fn version(&self) -> LibraryVersion {
        library_version()
    }

    fn open(&self, mask: Mask) -> EngineResult<LibmagicSession> {
        let flags = c_int::try_from(mask)
            .map_err(|_| EngineError::with_code(-1, format!("flag mask out of range: {mask:#x}")))?;
        // SAFETY: magic_open accepts any flag value and returns null on failure.
        let cookie = unsafe { magic_sys::magic_open(flags) };
        if cookie.is_null() {
            let err = io::Error::last_os_error();
            return Err(EngineError::with_code(
                err.raw_os_error().filter(|c| *c != 0).unwrap_or(-1),
                err.to_string(),
            ));
        }
        debug!(mask, "opened libmagic cookie");
        Ok(LibmagicSession { cookie })
    }
}

/// One libmagic cookie. Closed when dropped.
#[derive(Debug)]
pub struct LibmagicSession {
    cookie: magic_sys::magic_t,
}

// SAFETY: a cookie may move between threads as long as only one uses it at a
// time, which `&mut self` on every engine call enforces.
unsafe impl Send for LibmagicSession {}

impl LibmagicSession {
    fn last_error(&self) -> EngineError {
        // SAFETY: the cookie is live for as long as self.
        let (errno, ptr) = unsafe {
            (
                magic_sys::magic_errno(self.cookie),
                magic_sys::magic_error(self.cookie),
            )
        };
        let message = if ptr.is_null() {
            "unknown libmagic error".to_string()
        } else {
            // SAFETY: magic_error returns a NUL-terminated string owned by the cookie.
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        };
        EngineError {
            code: (errno != 0).then_some(errno),
            message,
        }
    }

    fn result(&self, ptr: *const c_char) -> EngineResult<String> {
        if ptr.is_null() {
            return Err(self.last_error());
        }
        // SAFETY: non-null results are NUL-terminated and valid until the next call.
        Ok(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    fn status(&self, rc: c_int) -> EngineResult<()> {
        if rc == -1 {
            Err(self.last_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for LibmagicSession {
    fn drop(&mut self) {
        // SAFETY: the cookie came from magic_open and is closed only here.
        unsafe { magic_sys::magic_close(self.cookie) };
    }
}

impl Session for LibmagicSession {
    fn load(&mut self, database: Option<&Path>) -> EngineResult<()> {
        let path = c_path(database)?;
        // SAFETY: live cookie; path is null or a valid C string.
        let rc = unsafe { magic_sys::magic_load(self.cookie, ptr_or_null(&path)) };
        self.status(rc)
    }

    fn set_flags(&mut self, mask: Mask) -> EngineResult<i32> {
        let flags = c_int::try_from(mask)
            .map_err(|_| EngineError::with_code(-1, format!("flag mask out of range: {mask:#x}")))?;
        // SAFETY: live cookie.
        let rc = unsafe { magic_sys::magic_setflags(self.cookie, flags) };
        if rc == -1 {
            return Err(EngineError::with_code(
                EINVAL,
                format!("libmagic rejected flags {mask:#x}"),
            ));
        }
        Ok(rc)
    }

    fn file(&mut self, path: &Path) -> EngineResult<String> {
        let path = c_path(Some(path))?;
        // SAFETY: live cookie; path is a valid C string.
        let ptr = unsafe { magic_sys::magic_file(self.cookie, ptr_or_null(&path)) };
        self.result(ptr)
    }

    fn buffer(&mut self, bytes: &[u8]) -> EngineResult<String> {
        // SAFETY: live cookie; pointer and length describe `bytes`.
        let ptr = unsafe { magic_sys::magic_buffer(self.cookie, bytes.as_ptr(), bytes.len()) };
        self.result(ptr)
    }

    fn descriptor(&mut self, fd: RawFd) -> EngineResult<String> {
        // SAFETY: live cookie; libmagic reports bad descriptors as errors.
        let ptr = unsafe { magic_sys::magic_descriptor(self.cookie, fd) };
        self.result(ptr)
    }

    fn list(&mut self, database: Option<&Path>) -> EngineResult<()> {
        let path = c_path(database)?;
        // SAFETY: live cookie; path is null or a valid C string.
        let rc = unsafe { magic_sys::magic_list(self.cookie, ptr_or_null(&path)) };
        self.status(rc)
    }

    fn check(&mut self, database: Option<&Path>) -> EngineResult<()> {
        let path = c_path(database)?;
        // SAFETY: live cookie; path is null or a valid C string.
        let rc = unsafe { magic_sys::magic_check(self.cookie, ptr_or_null(&path)) };
        self.status(rc)
    }

    fn compile(&mut self, database: Option<&Path>) -> EngineResult<()> {
        let path = c_path(database)?;
        // SAFETY: live cookie; path is null or a valid C string.
        let rc = unsafe { magic_sys::magic_compile(self.cookie, ptr_or_null(&path)) };
        self.status(rc)
    }

    fn get_param(&self, param: Param) -> EngineResult<usize> {
        let mut value: usize = 0;
        // SAFETY: live cookie; libmagic writes one size_t through the pointer.
        let rc = unsafe {
            magic_sys::magic_getparam(
                self.cookie,
                param.id(),
                &mut value as *mut usize as *mut c_void,
            )
        };
        self.status(rc).map(|()| value)
    }

    fn set_param(&mut self, param: Param, value: usize) -> EngineResult<()> {
        // SAFETY: live cookie; libmagic reads one size_t through the pointer.
        let rc = unsafe {
            magic_sys::magic_setparam(
                self.cookie,
                param.id(),
                &value as *const usize as *const c_void,
            )
        };
        self.status(rc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_version_difference_is_reported() {
        assert!(version_mismatch(BOUND_VERSION).is_none());
        assert!(version_mismatch(LibraryVersion::new(5, 37)).unwrap().contains("older"));
        assert!(version_mismatch(LibraryVersion::new(5, 45)).unwrap().contains("newer"));
    }
}
