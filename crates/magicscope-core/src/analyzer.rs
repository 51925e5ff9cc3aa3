//! The analyzer handle: one owned engine session plus its active flags.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::engine::{Backend, EngineError, EngineResult, Session};
use crate::error::{MagicError, Result};
use crate::flags::{FlagToken, Mask};
use crate::options::AnalyzerOptions;
use crate::params::Param;

/// Bytes read by [`Analyzer::describe_reader`] when no length is configured.
pub const DEFAULT_READ_LENGTH: usize = 1024;

static SIMPLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.\w/-]+").expect("valid simplify regex"));

/// Reduce a description to its lower-cased first word:
/// `text/plain; charset=us-ascii` becomes `text/plain`, `ASCII text` becomes
/// `ascii`.
pub fn simplify(description: &str) -> String {
    SIMPLE_RE
        .find(description)
        .map_or(description, |m| m.as_str())
        .to_lowercase()
}

fn initialization(e: EngineError) -> MagicError {
    MagicError::Initialization {
        code: e.code.unwrap_or(-1),
        message: e.message,
    }
}

fn database(e: EngineError) -> MagicError {
    MagicError::DatabaseLoad(e.message)
}

/// A content-type analyzer owning one engine session.
///
/// The session is released exactly once: by [`close`](Self::close) or, if
/// the handle is still open, when it is dropped. Every query on a closed
/// handle fails with [`MagicError::ClosedHandle`].
pub struct Analyzer<B: Backend> {
    backend: B,
    session: Option<B::Session>,
    mask: Mask,
    /// Set when a per-call mask could not be undone; the next query
    /// re-applies `mask` first.
    stale: bool,
    simplified: bool,
}

impl<B: Backend> Analyzer<B> {
    /// Open a session with `flags`, load the database and apply `options`.
    ///
    /// If loading or configuring fails, the session opened here is released
    /// before the error is returned.
    pub fn open(backend: B, flags: &[FlagToken], mut options: AnalyzerOptions) -> Result<Self> {
        let mask = backend.codec().resolve(flags)?;
        let session = backend.open(mask).map_err(initialization)?;

        let mut analyzer = Self {
            backend,
            session: Some(session),
            mask,
            stale: false,
            simplified: false,
        };

        let database = options.database.take();
        analyzer.load_database(database.as_deref())?;
        analyzer.configure(options)?;

        debug!(mask = analyzer.mask, "opened magic analyzer");
        Ok(analyzer)
    }

    /// Open from a loosely typed option table; unknown keys fail with
    /// [`MagicError::UnknownOption`] before any session is opened.
    pub fn open_with_table(backend: B, flags: &[FlagToken], table: &toml::Table) -> Result<Self> {
        let options = AnalyzerOptions::from_table(table)?;
        Self::open(backend, flags, options)
    }

    /// Open, run `f`, then close, returning what `f` returned.
    pub fn with<T>(
        backend: B,
        flags: &[FlagToken],
        options: AnalyzerOptions,
        f: impl FnOnce(&mut Self) -> T,
    ) -> Result<T> {
        let mut analyzer = Self::open(backend, flags, options)?;
        let out = f(&mut analyzer);
        analyzer.close();
        Ok(out)
    }

    /// Apply configuration to an open handle.
    pub fn configure(&mut self, options: AnalyzerOptions) -> Result<()> {
        if let Some(path) = options.database {
            self.load_database(Some(&path))?;
        }
        if let Some(flags) = options.flags {
            self.set_flags(&flags)?;
        }
        if let Some(simplified) = options.simplified {
            self.simplified = simplified;
        }
        Ok(())
    }

    // ─── Lifecycle ─────────────────────────────────────────

    /// Release the engine session. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session);
            debug!(mask = self.mask, "closed magic analyzer");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    fn session(&mut self) -> Result<&mut B::Session> {
        self.session.as_mut().ok_or(MagicError::ClosedHandle)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ─── Flags ─────────────────────────────────────────────

    /// Active flags, ascending by bit value.
    pub fn get_flags(&self) -> Vec<Option<&'static str>> {
        self.backend.codec().unpack(self.mask)
    }

    /// Active mask.
    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// Replace the active flags on the live session.
    pub fn set_flags(&mut self, flags: &[FlagToken]) -> Result<i32> {
        if self.is_closed() {
            return Err(MagicError::ClosedHandle);
        }
        let mask = self.backend.codec().resolve(flags)?;
        let status = self.session()?.set_flags(mask).map_err(initialization)?;
        self.mask = mask;
        self.stale = false;
        Ok(status)
    }

    pub fn is_simplified(&self) -> bool {
        self.simplified
    }

    pub fn set_simplified(&mut self, simplified: bool) {
        self.simplified = simplified;
    }

    // ─── Queries ───────────────────────────────────────────

    /// Describe the file at `path`.
    pub fn describe_file(
        &mut self,
        path: impl AsRef<Path>,
        flags: Option<&[FlagToken]>,
    ) -> Result<String> {
        let path = path.as_ref();
        self.query(flags, |s| s.file(path))
    }

    /// Describe an in-memory buffer.
    pub fn describe_buffer(&mut self, bytes: &[u8], flags: Option<&[FlagToken]>) -> Result<String> {
        self.query(flags, |s| s.buffer(bytes))
    }

    /// Describe the data behind a raw file descriptor.
    pub fn describe_descriptor(&mut self, fd: RawFd, flags: Option<&[FlagToken]>) -> Result<String> {
        self.query(flags, |s| s.descriptor(fd))
    }

    /// Describe the data behind anything that owns a descriptor.
    pub fn describe_fd(
        &mut self,
        source: &impl AsRawFd,
        flags: Option<&[FlagToken]>,
    ) -> Result<String> {
        self.describe_descriptor(source.as_raw_fd(), flags)
    }

    /// Describe up to `length` bytes read from the current position of
    /// `reader`. With `rewind`, the position is restored afterwards, also
    /// when reading or describing fails.
    pub fn describe_reader<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        length: usize,
        rewind: bool,
    ) -> Result<String> {
        if self.is_closed() {
            return Err(MagicError::ClosedHandle);
        }
        let start = if rewind {
            Some(reader.stream_position()?)
        } else {
            None
        };

        let mut buf = Vec::with_capacity(length);
        let result = reader
            .by_ref()
            .take(length as u64)
            .read_to_end(&mut buf)
            .map_err(MagicError::from)
            .and_then(|_| self.describe_buffer(&buf, None));

        if let Some(pos) = start {
            reader.seek(SeekFrom::Start(pos))?;
        }
        result
    }

    fn query<F>(&mut self, flags: Option<&[FlagToken]>, f: F) -> Result<String>
    where
        F: FnOnce(&mut B::Session) -> EngineResult<String>,
    {
        let stored = self.mask;
        let session = self.session.as_mut().ok_or(MagicError::ClosedHandle)?;
        if self.stale {
            session.set_flags(stored).map_err(initialization)?;
            self.stale = false;
            debug!(mask = stored, "re-applied magic flags");
        }
        let requested = flags
            .map(|tokens| self.backend.codec().resolve(tokens))
            .transpose()?;

        let description = match requested {
            Some(mask) if mask != stored => {
                let mut scoped = ScopedFlags::apply(session, mask, stored, &mut self.stale)?;
                f(&mut *scoped)
            }
            _ => f(session),
        }
        .map_err(|e| MagicError::Analysis(e.message))?;

        Ok(if self.simplified {
            simplify(&description)
        } else {
            description
        })
    }

    // ─── Database ──────────────────────────────────────────

    /// Load a database into the session, the default one for `None`.
    pub fn load_database(&mut self, path: Option<&Path>) -> Result<()> {
        self.session()?.load(path).map_err(database)
    }

    /// Print the database entries to stdout (engine behavior).
    pub fn list_database(&mut self, path: Option<&Path>) -> Result<()> {
        self.session()?.list(path).map_err(database)
    }

    /// Whether the database parses cleanly.
    pub fn check_database(&mut self, path: Option<&Path>) -> Result<bool> {
        match self.session()?.check(path) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(error = %e, "magic database check failed");
                Ok(false)
            }
        }
    }

    /// Compile a database source file; the engine writes `<name>.mgc`.
    pub fn compile_database(&mut self, path: Option<&Path>) -> Result<()> {
        self.session()?.compile(path).map_err(database)
    }

    /// Whether the default database is valid.
    pub fn is_valid(&mut self) -> Result<bool> {
        self.check_database(None)
    }

    // ─── Parameters ────────────────────────────────────────

    fn ensure_param(&self, param: Param) -> Result<()> {
        if param.since() > self.backend.version() {
            return Err(MagicError::UnsupportedParam(param.to_string()));
        }
        Ok(())
    }

    pub fn get_param(&self, param: Param) -> Result<usize> {
        let session = self.session.as_ref().ok_or(MagicError::ClosedHandle)?;
        self.ensure_param(param)?;
        session
            .get_param(param)
            .map_err(|e| MagicError::Analysis(e.message))
    }

    pub fn set_param(&mut self, param: Param, value: usize) -> Result<()> {
        if self.is_closed() {
            return Err(MagicError::ClosedHandle);
        }
        self.ensure_param(param)?;
        self.session()?
            .set_param(param, value)
            .map_err(|e| MagicError::Analysis(e.message))
    }
}

impl<B: Backend> Drop for Analyzer<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: Backend> fmt::Debug for Analyzer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("flags", &self.backend.codec().symbols(self.mask))
            .field("simplified", &self.simplified)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Session with a temporary mask; the previous mask is restored on drop.
/// A failed restore marks the analyzer stale instead.
struct ScopedFlags<'a, S: Session> {
    session: &'a mut S,
    restore: Mask,
    stale: &'a mut bool,
}

impl<'a, S: Session> ScopedFlags<'a, S> {
    fn apply(session: &'a mut S, mask: Mask, restore: Mask, stale: &'a mut bool) -> Result<Self> {
        session.set_flags(mask).map_err(initialization)?;
        Ok(Self {
            session,
            restore,
            stale,
        })
    }
}

impl<S: Session> Deref for ScopedFlags<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: Session> DerefMut for ScopedFlags<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: Session> Drop for ScopedFlags<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.session.set_flags(self.restore) {
            warn!(mask = self.restore, error = %e, "failed to restore magic flags");
            *self.stale = true;
        }
    }
}
