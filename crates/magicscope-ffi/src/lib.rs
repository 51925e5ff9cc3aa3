//! magicscope FFI: bindings to libmagic.

pub mod libmagic;

use magicscope_core::{Analyzer, AnalyzerCache, AnalyzerOptions, FlagToken, Mask, Result};

pub use libmagic::{
    BOUND_VERSION, Libmagic, LibmagicSession, codec, default_database_path, library_version,
};

/// An analyzer backed by the linked libmagic.
pub type FileMagic = Analyzer<Libmagic>;

/// A [`FileMagic`] cache keyed by flags and options.
pub type MagicCache = AnalyzerCache<Libmagic>;

/// Open a libmagic analyzer.
pub fn open(flags: &[FlagToken], options: AnalyzerOptions) -> Result<FileMagic> {
    FileMagic::open(Libmagic, flags, options)
}

/// Open a libmagic analyzer with `mime` added to `flags`.
pub fn mime(flags: &[FlagToken], options: AnalyzerOptions) -> Result<FileMagic> {
    let mut flags = flags.to_vec();
    flags.insert(0, FlagToken::from("mime"));
    open(&flags, options)
}

/// Open an analyzer for the duration of `f`, closing it afterwards.
pub fn with<T>(
    flags: &[FlagToken],
    options: AnalyzerOptions,
    f: impl FnOnce(&mut FileMagic) -> T,
) -> Result<T> {
    FileMagic::with(Libmagic, flags, options, f)
}

/// Empty analyzer cache over libmagic.
pub fn cache() -> MagicCache {
    MagicCache::new(Libmagic)
}

/// Resolve a flag list against the linked library.
pub fn resolve(flags: &[FlagToken]) -> Result<Mask> {
    codec().resolve(flags)
}

/// Whether `symbol` names a flag the linked library provides.
pub fn is_flag_supported(symbol: &str) -> bool {
    codec().is_supported(symbol)
}
