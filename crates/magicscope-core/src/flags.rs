//! Symbolic flag vocabulary and the codec between symbols and engine masks.
//!
//! Every flag has a lower-case symbolic name (`symlink`, `mime_type`, ...) and
//! a bit value assigned by the engine ABI. Single flags are one power-of-two
//! bit; composites (`mime`, `nodesc`, `no_check_builtin`) are the union of
//! their members. `none` is zero and is always implicitly part of a mask.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::error::{MagicError, Result};
use crate::version::LibraryVersion;

/// Packed bitmask handed to the engine.
pub type Mask = u32;

/// How a vocabulary entry maps to bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValue {
    /// A single power-of-two bit.
    Bit(Mask),
    /// Union of other entries; only members available in the engine count.
    Union(&'static [&'static str]),
    /// Legacy name for another entry.
    Alias(&'static str),
    /// Accepted for compatibility, contributes nothing.
    Zero,
}

/// One entry of the flag vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagDef {
    pub name: &'static str,
    pub value: FlagValue,
    /// First engine release providing the flag.
    pub since: LibraryVersion,
    pub doc: &'static str,
}

const fn def(
    name: &'static str,
    value: FlagValue,
    since: (u32, u32),
    doc: &'static str,
) -> FlagDef {
    FlagDef {
        name,
        value,
        since: LibraryVersion::new(since.0, since.1),
        doc,
    }
}

use FlagValue::{Alias, Bit, Union, Zero};

/// The full vocabulary, in engine header order.
pub static VOCABULARY: &[FlagDef] = &[
    def("none", Zero, (4, 0), "No special handling."),
    def("debug", Bit(0x0000001), (4, 0), "Print debugging messages to stderr."),
    def("symlink", Bit(0x0000002), (4, 0), "If the file queried is a symlink, follow it."),
    def("compress", Bit(0x0000004), (4, 0), "If the file is compressed, unpack it and look at the contents."),
    def("devices", Bit(0x0000008), (4, 0), "Open block or character special devices and look at their contents."),
    def("mime_type", Bit(0x0000010), (4, 0), "Return a MIME type string, instead of a textual description."),
    def("continue", Bit(0x0000020), (4, 0), "Return all matches, not just the first."),
    def("check", Bit(0x0000040), (4, 0), "Check the magic database for consistency and print warnings to stderr."),
    def("preserve_atime", Bit(0x0000080), (4, 0), "Attempt to preserve the access time of files analysed."),
    def("raw", Bit(0x0000100), (4, 0), "Don't translate unprintable characters to a \\ooo octal representation."),
    def("error", Bit(0x0000200), (4, 0), "Treat operating system errors as real errors instead of printing them in the result."),
    def("mime_encoding", Bit(0x0000400), (5, 0), "Return a MIME encoding, instead of a textual description."),
    def("mime", Union(&["mime_type", "mime_encoding"]), (5, 0), "Shorthand for mime_type | mime_encoding."),
    def("apple", Bit(0x0000800), (5, 4), "Return the Apple creator and type."),
    def("extension", Bit(0x1000000), (5, 22), "Return a slash-separated list of extensions for this file type."),
    def("compress_transp", Bit(0x2000000), (5, 33), "Don't report on compression, only report about the uncompressed data."),
    def("no_compress_fork", Bit(0x4000000), (5, 44), "Don't allow decompressors that use fork."),
    def("nodesc", Union(&["extension", "mime_type", "mime_encoding", "apple"]), (5, 22), "Shorthand for extension | mime | apple."),
    def("no_check_compress", Bit(0x0001000), (4, 0), "Don't look inside compressed files."),
    def("no_check_tar", Bit(0x0002000), (4, 0), "Don't examine tar files."),
    def("no_check_soft", Bit(0x0004000), (4, 0), "Don't consult magic files."),
    def("no_check_apptype", Bit(0x0008000), (4, 0), "Don't check for EMX application type (only on EMX)."),
    def("no_check_elf", Bit(0x0010000), (4, 0), "Don't print ELF details."),
    def("no_check_text", Bit(0x0020000), (5, 0), "Don't check for various types of text files."),
    def("no_check_cdf", Bit(0x0040000), (5, 0), "Don't get extra information on MS Composite Document Files."),
    def("no_check_csv", Bit(0x0080000), (5, 38), "Don't examine CSV files."),
    def("no_check_tokens", Bit(0x0100000), (4, 0), "Don't look for known tokens inside ascii files."),
    def("no_check_encoding", Bit(0x0200000), (5, 0), "Don't check text encodings."),
    def("no_check_json", Bit(0x0400000), (5, 35), "Don't examine JSON files."),
    def("no_check_simh", Bit(0x0800000), (5, 40), "Don't examine SIMH tape files."),
    def(
        "no_check_builtin",
        Union(&[
            "no_check_compress",
            "no_check_tar",
            "no_check_apptype",
            "no_check_elf",
            "no_check_text",
            "no_check_csv",
            "no_check_cdf",
            "no_check_tokens",
            "no_check_encoding",
            "no_check_json",
            "no_check_simh",
        ]),
        (5, 0),
        "No built-in tests; only consult the magic file.",
    ),
    def("no_check_ascii", Alias("no_check_text"), (4, 0), "Renamed to no_check_text."),
    def("no_check_fortran", Zero, (4, 0), "Does nothing; kept for compatibility."),
    def("no_check_troff", Zero, (4, 0), "Does nothing; kept for compatibility."),
];

fn lookup(name: &str) -> Option<&'static FlagDef> {
    VOCABULARY.iter().find(|d| d.name == name)
}

/// A single entry of a flag list: a symbolic name or raw bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagToken {
    Symbol(String),
    Bits(Mask),
}

impl FlagToken {
    /// Parse a command-line style token. Numbers (decimal or `0x` hex) become
    /// raw bits; identifiers, with an optional leading `:`, become symbols.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some(hex) = input.strip_prefix("0x") {
            return Mask::from_str_radix(hex, 16)
                .map(Self::Bits)
                .map_err(|_| MagicError::InvalidFlagType(format!("{input:?}")));
        }
        if input.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            return input
                .parse::<Mask>()
                .map(Self::Bits)
                .map_err(|_| MagicError::InvalidFlagType(format!("{input:?}")));
        }

        let name = input.strip_prefix(':').unwrap_or(input);
        let is_identifier = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !is_identifier {
            return Err(MagicError::InvalidFlagType(format!("{input:?}")));
        }
        Ok(Self::Symbol(name.to_ascii_lowercase()))
    }

    /// Convert a loosely typed configuration value.
    pub fn from_value(value: &toml::Value) -> Result<Self> {
        match value {
            toml::Value::String(s) => Self::parse(s),
            toml::Value::Integer(i) => Mask::try_from(*i)
                .map(Self::Bits)
                .map_err(|_| MagicError::InvalidFlagType(format!("Integer {i}"))),
            other => Err(MagicError::InvalidFlagType(other.type_str().to_string())),
        }
    }

    /// Convert a value that is either one token or an array of them.
    pub fn list_from_value(value: &toml::Value) -> Result<Vec<Self>> {
        match value {
            toml::Value::Array(items) => items.iter().map(Self::from_value).collect(),
            single => Ok(vec![Self::from_value(single)?]),
        }
    }
}

impl fmt::Display for FlagToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(s) => write!(f, ":{s}"),
            Self::Bits(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FlagToken {
    fn from(s: &str) -> Self {
        Self::Symbol(s.to_string())
    }
}

impl From<String> for FlagToken {
    fn from(s: String) -> Self {
        Self::Symbol(s)
    }
}

impl From<Mask> for FlagToken {
    fn from(bits: Mask) -> Self {
        Self::Bits(bits)
    }
}

/// Build a flag list from symbols, e.g. `flag_list(["mime", "continue"])`.
pub fn flag_list<I, T>(items: I) -> Vec<FlagToken>
where
    I: IntoIterator<Item = T>,
    T: Into<FlagToken>,
{
    items.into_iter().map(Into::into).collect()
}

// ─── Codec ─────────────────────────────────────────────────

/// Translator between flag lists and masks for one engine release.
///
/// Tables are built once and never mutated, so a codec can be shared freely
/// across analyzers and threads.
#[derive(Debug, Clone)]
pub struct FlagCodec {
    version: LibraryVersion,
    supported: HashMap<&'static str, Mask>,
    by_bit: HashMap<Mask, &'static str>,
}

impl FlagCodec {
    /// Codec for the flags available in the given engine release.
    pub fn for_version(version: LibraryVersion) -> Self {
        let available = |d: &FlagDef| d.since <= version;

        let supported = VOCABULARY
            .iter()
            .filter(|d| available(*d))
            .map(|d| (d.name, effective_bits(d, &available)))
            .collect();

        // Decoding knows every single-bit flag, even ones this engine lacks,
        // so masks coming from elsewhere still render.
        let by_bit = VOCABULARY
            .iter()
            .filter_map(|d| match d.value {
                Bit(bits) => Some((bits, d.name)),
                _ => None,
            })
            .collect();

        Self {
            version,
            supported,
            by_bit,
        }
    }

    pub fn version(&self) -> LibraryVersion {
        self.version
    }

    /// Resolve a flag list into a mask.
    pub fn resolve(&self, tokens: &[FlagToken]) -> Result<Mask> {
        tokens.iter().try_fold(0, |mask, token| {
            let bits = match token {
                FlagToken::Bits(bits) => *bits,
                FlagToken::Symbol(name) => self.symbol_bits(name)?,
            };
            Ok(mask | bits)
        })
    }

    fn symbol_bits(&self, name: &str) -> Result<Mask> {
        match self.supported.get(name) {
            Some(bits) => Ok(*bits),
            None if lookup(name).is_some() => Err(MagicError::UnsupportedFlag(format!(":{name}"))),
            None => Err(MagicError::UnknownFlag(format!(":{name}"))),
        }
    }

    /// Decompose a mask into symbols, ascending by bit value. Bits without a
    /// known symbol yield `None` in their position.
    pub fn unpack(&self, mask: Mask) -> Vec<Option<&'static str>> {
        let mut symbols = VecDeque::new();
        let mut remaining = mask;
        while remaining > 0 {
            let bit = 1 << remaining.ilog2();
            symbols.push_front(self.by_bit.get(&bit).copied());
            remaining -= bit;
        }
        symbols.into()
    }

    /// Like [`unpack`](Self::unpack), with unknown bits rendered as hex.
    pub fn symbols(&self, mask: Mask) -> Vec<String> {
        let mut out = Vec::new();
        let mut remaining = mask;
        while remaining > 0 {
            let bit = 1 << remaining.ilog2();
            out.push(match self.by_bit.get(&bit) {
                Some(name) => (*name).to_string(),
                None => format!("{bit:#x}"),
            });
            remaining -= bit;
        }
        out.reverse();
        out
    }

    /// Whether the symbol exists in the vocabulary at all.
    pub fn is_known(&self, name: &str) -> bool {
        lookup(name).is_some()
    }

    /// Whether the symbol can be resolved against this engine release.
    pub fn is_supported(&self, name: &str) -> bool {
        self.supported.contains_key(name)
    }

    /// Supported flags in vocabulary order, with their effective bits.
    pub fn supported(&self) -> impl Iterator<Item = (&'static FlagDef, Mask)> + '_ {
        VOCABULARY
            .iter()
            .filter_map(|d| self.supported.get(d.name).map(|bits| (d, *bits)))
    }
}

fn effective_bits(d: &FlagDef, available: &impl Fn(&FlagDef) -> bool) -> Mask {
    match d.value {
        Bit(bits) => bits,
        Zero => 0,
        Alias(target) => lookup(target).map_or(0, |t| effective_bits(t, available)),
        Union(members) => members
            .iter()
            .filter_map(|m| lookup(m))
            .filter(|m| available(*m))
            .fold(0, |acc, m| acc | effective_bits(m, available)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> FlagCodec {
        FlagCodec::for_version(LibraryVersion::new(5, 45))
    }

    #[test]
    fn empty_list_is_none() {
        assert_eq!(codec().resolve(&[]).unwrap(), 0);
        assert_eq!(codec().resolve(&flag_list(["none"])).unwrap(), 0);
        assert!(codec().unpack(0).is_empty());
    }

    #[test]
    fn resolves_symbols_and_numbers() {
        let c = codec();
        assert_eq!(c.resolve(&flag_list(["mime", "continue"])).unwrap(), 1072);
        assert_eq!(
            c.resolve(&[FlagToken::from("mime"), FlagToken::Bits(16)]).unwrap(),
            0x410 | 16
        );
        assert_eq!(c.resolve(&[FlagToken::Bits(0x4000_0000)]).unwrap(), 0x4000_0000);
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = codec().resolve(&flag_list(["not_a_real_flag"])).unwrap_err();
        assert!(matches!(err, MagicError::UnknownFlag(ref s) if s == ":not_a_real_flag"));
    }

    #[test]
    fn flag_missing_from_old_engine_is_unsupported() {
        let old = FlagCodec::for_version(LibraryVersion::new(5, 30));
        let err = old.resolve(&flag_list(["no_check_csv"])).unwrap_err();
        assert!(matches!(err, MagicError::UnsupportedFlag(_)));
        assert!(old.is_known("no_check_csv"));
        assert!(!old.is_supported("no_check_csv"));
        assert!(codec().is_supported("no_check_csv"));
    }

    #[test]
    fn builtin_union_tracks_engine_release() {
        let old = FlagCodec::for_version(LibraryVersion::new(5, 30));
        let old_builtin = old.resolve(&flag_list(["no_check_builtin"])).unwrap();
        let new_builtin = codec().resolve(&flag_list(["no_check_builtin"])).unwrap();
        assert_eq!(old_builtin & 0x0400000, 0);
        assert_eq!(new_builtin & 0x0400000, 0x0400000);
        assert_eq!(new_builtin & 0x0004000, 0, "soft checks are not builtin");
    }

    #[test]
    fn aliases_resolve_but_do_not_decode() {
        let c = codec();
        let mask = c.resolve(&flag_list(["no_check_ascii"])).unwrap();
        assert_eq!(mask, 0x0020000);
        assert_eq!(c.unpack(mask), vec![Some("no_check_text")]);
        assert_eq!(c.resolve(&flag_list(["no_check_troff"])).unwrap(), 0);
    }

    #[test]
    fn unpack_is_ascending() {
        let c = codec();
        assert_eq!(
            c.unpack(1072),
            vec![Some("mime_type"), Some("continue"), Some("mime_encoding")]
        );
    }

    #[test]
    fn unpack_round_trips_ordered_symbols() {
        let c = codec();
        let names = ["symlink", "compress", "mime_type", "raw", "no_check_elf", "extension"];
        let mask = c.resolve(&flag_list(names)).unwrap();
        let decoded: Vec<_> = c.unpack(mask).into_iter().flatten().collect();
        assert_eq!(decoded, names);
    }

    #[test]
    fn unknown_bits_decode_to_none() {
        let c = codec();
        assert_eq!(c.unpack(0x4000_0002), vec![Some("symlink"), None]);
        assert_eq!(c.symbols(0x4000_0002), vec!["symlink", "0x40000000"]);
    }

    #[test]
    fn parse_tokens() {
        assert_eq!(FlagToken::parse(":mime").unwrap(), FlagToken::from("mime"));
        assert_eq!(FlagToken::parse("MIME_TYPE").unwrap(), FlagToken::from("mime_type"));
        assert_eq!(FlagToken::parse("16").unwrap(), FlagToken::Bits(16));
        assert_eq!(FlagToken::parse("0x410").unwrap(), FlagToken::Bits(0x410));
        assert!(matches!(FlagToken::parse("-3"), Err(MagicError::InvalidFlagType(_))));
        assert!(matches!(FlagToken::parse("1.5"), Err(MagicError::InvalidFlagType(_))));
        assert!(matches!(FlagToken::parse("mime type"), Err(MagicError::InvalidFlagType(_))));
    }

    #[test]
    fn tokens_from_config_values() {
        let value: toml::Value = toml::from_str::<toml::Table>(r#"flags = ["mime", 32]"#)
            .unwrap()
            .remove("flags")
            .unwrap();
        assert_eq!(
            FlagToken::list_from_value(&value).unwrap(),
            vec![FlagToken::from("mime"), FlagToken::Bits(32)]
        );
        assert!(matches!(
            FlagToken::from_value(&toml::Value::Boolean(true)),
            Err(MagicError::InvalidFlagType(ref t)) if t == "boolean"
        ));
        assert!(matches!(
            FlagToken::from_value(&toml::Value::Integer(-1)),
            Err(MagicError::InvalidFlagType(_))
        ));
    }

    #[test]
    fn config_strings_parse_like_command_line() {
        let value: toml::Value = toml::from_str::<toml::Table>(r#"flags = ["MIME", ":Continue"]"#)
            .unwrap()
            .remove("flags")
            .unwrap();
        let tokens = FlagToken::list_from_value(&value).unwrap();
        assert_eq!(tokens, vec![FlagToken::from("mime"), FlagToken::from("continue")]);
        assert_eq!(codec().resolve(&tokens).unwrap(), 0x430);

        let bad = toml::Value::String("mime type".to_string());
        assert!(matches!(FlagToken::from_value(&bad), Err(MagicError::InvalidFlagType(_))));
    }

    #[test]
    fn supported_lists_vocabulary_order() {
        let c = FlagCodec::for_version(LibraryVersion::new(5, 0));
        let names: Vec<_> = c.supported().map(|(d, _)| d.name).take(3).collect();
        assert_eq!(names, ["none", "debug", "symlink"]);
        assert!(c.supported().all(|(d, _)| d.since <= LibraryVersion::new(5, 0)));
    }
}
