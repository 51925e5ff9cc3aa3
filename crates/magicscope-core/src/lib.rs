//! magicscope core: flag codec, analyzer handle and configuration for
//! content-type identification through a pluggable signature engine.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod options;
pub mod params;
pub mod version;

pub use analyzer::{Analyzer, DEFAULT_READ_LENGTH, simplify};
pub use cache::AnalyzerCache;
pub use config::MagicConfig;
pub use engine::{Backend, EngineError, EngineResult, Session};
pub use error::{MagicError, Result};
pub use flags::{FlagCodec, FlagDef, FlagToken, FlagValue, Mask, VOCABULARY, flag_list};
pub use options::AnalyzerOptions;
pub use params::Param;
pub use version::LibraryVersion;
