//! Seam between the analyzer and the signature-matching engine.
//!
//! A [`Backend`] opens sessions; a [`Session`] is one configured engine
//! cookie. Releasing a session is its `Drop`, so ownership alone guarantees
//! it happens exactly once.

use std::os::fd::RawFd;
use std::path::Path;

use thiserror::Error;

use crate::flags::{FlagCodec, Mask};
use crate::params::Param;
use crate::version::LibraryVersion;

/// Failure reported by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub code: Option<i32>,
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// One live engine session.
///
/// Not meant for concurrent use; callers that need parallel analysis open
/// one session per thread.
pub trait Session {
    /// Load a database, or the engine default when `database` is `None`.
    fn load(&mut self, database: Option<&Path>) -> EngineResult<()>;
    /// Replace the session mask, returning the engine's status.
    fn set_flags(&mut self, mask: Mask) -> EngineResult<i32>;

    fn file(&mut self, path: &Path) -> EngineResult<String>;
    fn buffer(&mut self, bytes: &[u8]) -> EngineResult<String>;
    fn descriptor(&mut self, fd: RawFd) -> EngineResult<String>;

    fn list(&mut self, database: Option<&Path>) -> EngineResult<()>;
    fn check(&mut self, database: Option<&Path>) -> EngineResult<()>;
    fn compile(&mut self, database: Option<&Path>) -> EngineResult<()>;

    fn get_param(&self, param: Param) -> EngineResult<usize>;
    fn set_param(&mut self, param: Param, value: usize) -> EngineResult<()>;
}

/// Factory for sessions of one engine build.
pub trait Backend {
    type Session: Session;

    /// Flag codec matching the flags this build provides.
    fn codec(&self) -> &FlagCodec;
    fn version(&self) -> LibraryVersion;
    fn open(&self, mask: Mask) -> EngineResult<Self::Session>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory engine that counts sessions, for lifecycle tests.

    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;

    const MIME_TYPE: Mask = 0x10;
    const ERROR: Mask = 0x200;

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub opened: usize,
        pub released: usize,
        pub loads: Vec<Option<String>>,
        /// Mask active at each query, in call order.
        pub query_masks: Vec<Mask>,
        pub fail_open: bool,
        pub fail_load: bool,
        pub reject_mask: Option<Mask>,
        pub fail_query: bool,
    }

    impl FakeState {
        pub fn live(&self) -> usize {
            self.opened - self.released
        }
    }

    #[derive(Debug, Clone)]
    pub struct FakeBackend {
        pub state: Rc<RefCell<FakeState>>,
        codec: Rc<FlagCodec>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                state: Rc::default(),
                codec: Rc::new(FlagCodec::for_version(LibraryVersion::new(5, 45))),
            }
        }

        pub fn state(&self) -> std::cell::Ref<'_, FakeState> {
            self.state.borrow()
        }

        pub fn state_mut(&self) -> std::cell::RefMut<'_, FakeState> {
            self.state.borrow_mut()
        }
    }

    #[derive(Debug)]
    pub struct FakeSession {
        state: Rc<RefCell<FakeState>>,
        mask: Mask,
        params: HashMap<Param, usize>,
    }

    impl FakeSession {
        fn describe(&self, kind: &str) -> String {
            self.state.borrow_mut().query_masks.push(self.mask);
            match (kind, self.mask & MIME_TYPE != 0) {
                ("script", false) => "POSIX shell script, ASCII text executable".to_string(),
                ("script", true) => "text/x-shellscript; charset=us-ascii".to_string(),
                ("text", false) => "ASCII text".to_string(),
                ("text", true) => "text/plain; charset=us-ascii".to_string(),
                (_, false) => "data".to_string(),
                (_, true) => "application/octet-stream; charset=binary".to_string(),
            }
        }

        fn classify(bytes: &[u8]) -> &'static str {
            if bytes.starts_with(b"#!/bin/sh") {
                "script"
            } else if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii()) {
                "text"
            } else {
                "data"
            }
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.state.borrow_mut().released += 1;
        }
    }

    impl Session for FakeSession {
        fn load(&mut self, database: Option<&Path>) -> EngineResult<()> {
            let mut state = self.state.borrow_mut();
            if state.fail_load {
                return Err(EngineError::new("could not find any valid magic files!"));
            }
            state
                .loads
                .push(database.map(|p| p.to_string_lossy().to_string()));
            Ok(())
        }

        fn set_flags(&mut self, mask: Mask) -> EngineResult<i32> {
            if self.state.borrow().reject_mask == Some(mask) {
                return Err(EngineError::with_code(22, "invalid flags"));
            }
            self.mask = mask;
            Ok(0)
        }

        fn file(&mut self, path: &Path) -> EngineResult<String> {
            match std::fs::read(path) {
                Ok(bytes) => Ok(self.describe(Self::classify(&bytes))),
                Err(e) if self.mask & ERROR != 0 => Err(EngineError::with_code(
                    e.raw_os_error().unwrap_or(-1),
                    format!("cannot open `{}' ({e})", path.display()),
                )),
                Err(e) => Ok(format!("cannot open `{}' ({e})", path.display())),
            }
        }

        fn buffer(&mut self, bytes: &[u8]) -> EngineResult<String> {
            if self.state.borrow().fail_query {
                return Err(EngineError::new("buffer analysis failed"));
            }
            Ok(self.describe(Self::classify(bytes)))
        }

        fn descriptor(&mut self, fd: RawFd) -> EngineResult<String> {
            if fd < 0 {
                return Err(EngineError::with_code(9, "Bad file descriptor"));
            }
            Ok(self.describe("data"))
        }

        fn list(&mut self, _database: Option<&Path>) -> EngineResult<()> {
            Ok(())
        }

        fn check(&mut self, database: Option<&Path>) -> EngineResult<()> {
            match database {
                Some(p) if !p.exists() => Err(EngineError::new("could not find any valid magic files!")),
                _ => Ok(()),
            }
        }

        fn compile(&mut self, database: Option<&Path>) -> EngineResult<()> {
            self.check(database)
        }

        fn get_param(&self, param: Param) -> EngineResult<usize> {
            Ok(self
                .params
                .get(&param)
                .copied()
                .unwrap_or_else(|| param.default_value()))
        }

        fn set_param(&mut self, param: Param, value: usize) -> EngineResult<()> {
            self.params.insert(param, value);
            Ok(())
        }
    }

    impl Backend for FakeBackend {
        type Session = FakeSession;

        fn codec(&self) -> &FlagCodec {
            &self.codec
        }

        fn version(&self) -> LibraryVersion {
            self.codec.version()
        }

        fn open(&self, mask: Mask) -> EngineResult<FakeSession> {
            let mut state = self.state.borrow_mut();
            if state.fail_open {
                return Err(EngineError::with_code(12, "Cannot allocate memory"));
            }
            state.opened += 1;
            Ok(FakeSession {
                state: Rc::clone(&self.state),
                mask,
                params: HashMap::new(),
            })
        }
    }
}
