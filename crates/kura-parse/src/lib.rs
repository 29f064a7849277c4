//! Filename parsing for kura.
//!
//! Turns a raw file path into a [`ParsedInfo`](kura_core::ParsedInfo) by
//! running an ordered cascade of rule groups over the file name (and, for
//! loose images or unhelpful names, over the folders above it):
//!
//! - **Series** - text before the first volume/chapter marker
//! - **Volume** - `v01`, `Vol. 3`, `Tome 2`, `第3卷`
//! - **Chapter** - `c012`, `Chapter 5.5`, `#12`, trailing numbers
//! - **Edition / special** - `Omnibus`, `SP01`, `Omake`, specials folders
//!
//! The first matching rule in a group wins. Names that match nothing still
//! produce an info with the cleaned file name as series.
//!
//! ```rust,ignore
//! use kura_parse::FilenameParser;
//! use kura_core::LibraryType;
//! use std::path::Path;
//!
//! let parser = FilenameParser::default();
//! let info = parser.parse(
//!     Path::new("/manga/Beelzebub/Beelzebub v02 c010.cbz"),
//!     Path::new("/manga"),
//!     LibraryType::Manga,
//! );
//! assert_eq!(info.series, "Beelzebub");
//! ```

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

mod clean;
mod parser;
mod rules;

pub use clean::{clean_title, normalize, remove_extension, strip_special_markers};
pub use parser::{FilenameParser, MetadataHints, MetadataSource, ParseOutcome};
