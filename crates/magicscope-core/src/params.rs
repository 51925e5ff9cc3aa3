use std::fmt;

use crate::error::{MagicError, Result};
use crate::version::LibraryVersion;

/// Engine tunables readable and writable on an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    IndirMax,
    NameMax,
    ElfPhnumMax,
    ElfShnumMax,
    ElfNotesMax,
    RegexMax,
    BytesMax,
    EncodingMax,
    ElfShsizeMax,
}

impl Param {
    pub const ALL: [Param; 9] = [
        Self::IndirMax,
        Self::NameMax,
        Self::ElfPhnumMax,
        Self::ElfShnumMax,
        Self::ElfNotesMax,
        Self::RegexMax,
        Self::BytesMax,
        Self::EncodingMax,
        Self::ElfShsizeMax,
    ];

    /// Engine-side identifier.
    pub fn id(self) -> i32 {
        match self {
            Self::IndirMax => 0,
            Self::NameMax => 1,
            Self::ElfPhnumMax => 2,
            Self::ElfShnumMax => 3,
            Self::ElfNotesMax => 4,
            Self::RegexMax => 5,
            Self::BytesMax => 6,
            Self::EncodingMax => 7,
            Self::ElfShsizeMax => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::IndirMax => "indir_max",
            Self::NameMax => "name_max",
            Self::ElfPhnumMax => "elf_phnum_max",
            Self::ElfShnumMax => "elf_shnum_max",
            Self::ElfNotesMax => "elf_notes_max",
            Self::RegexMax => "regex_max",
            Self::BytesMax => "bytes_max",
            Self::EncodingMax => "encoding_max",
            Self::ElfShsizeMax => "elf_shsize_max",
        }
    }

    /// Value the engine documents as its default.
    pub fn default_value(self) -> usize {
        match self {
            Self::IndirMax | Self::NameMax => 50,
            Self::ElfPhnumMax => 2048,
            Self::ElfShnumMax => 32768,
            Self::ElfNotesMax => 256,
            Self::RegexMax => 8192,
            Self::BytesMax => 7_340_032,
            Self::EncodingMax => 65536,
            Self::ElfShsizeMax => 134_217_728,
        }
    }

    /// First engine release exposing the parameter.
    pub fn since(self) -> LibraryVersion {
        match self {
            Self::IndirMax | Self::NameMax | Self::ElfPhnumMax | Self::ElfShnumMax => {
                LibraryVersion::new(5, 21)
            }
            Self::ElfNotesMax => LibraryVersion::new(5, 22),
            Self::RegexMax => LibraryVersion::new(5, 26),
            Self::BytesMax => LibraryVersion::new(5, 29),
            Self::EncodingMax => LibraryVersion::new(5, 38),
            Self::ElfShsizeMax => LibraryVersion::new(5, 43),
        }
    }

    /// Look a parameter up by name; the `param_` prefix is optional.
    pub fn from_symbol(symbol: &str) -> Result<Self> {
        let name = symbol.trim_start_matches(':');
        let name = name.strip_prefix("param_").unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| MagicError::UnknownParam(symbol.to_string()))
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param_{}", self.name())
    }
}
