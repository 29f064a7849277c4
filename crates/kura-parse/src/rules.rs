//! The ordered rule cascade.
//!
//! Each group is a list of `(name, pattern)` pairs tried top to bottom; the
//! first rule that matches wins. Order is part of the parsing contract: many
//! names match several rules at different specificity, so reordering a table
//! changes how existing libraries are grouped.

use fancy_regex::{Regex, RegexBuilder};

/// Numeric range token: `N`, `N.F`, `N-M`.
macro_rules! numrange {
    () => {
        r"\d+(?:\.\d+)?(?:-\d+(?:\.\d+)?)?"
    };
}

/// Markers that introduce a volume or chapter number in manga names.
macro_rules! manga_marker {
    () => {
        r"(?:v|vol\.?|volume|tome|c|ch\.?|chapter|episode|ep\.?)"
    };
}

pub(crate) type RuleTable = &'static [(&'static str, &'static str)];

pub(crate) const MANGA_SERIES: RuleTable = &[
    (
        "series-before-marker",
        concat!(
            r"(?i)^(?P<Series>.+?)(?:\s|_|-)+(?:\(|\[)?",
            manga_marker!(),
            r"(?:\s|_)?\d+"
        ),
    ),
    (
        "series-before-cjk-number",
        r"(?i)^(?P<Series>.+?)(?:\s|_)*第?\d+(?:-\d+)?(?:卷|册|巻|권|话|話|화|章)",
    ),
    (
        "series-before-dash-number",
        r"(?i)^(?P<Series>.+?)(?:\s|_)+-(?:\s|_)+\d+",
    ),
    (
        "series-before-trailing-number",
        r"(?i)^(?P<Series>.+?)(?:\s|_)+\d+(?:\.\d+)?(?:-\d+)?(?:(?:\s|_)*(?:\(|\[).*)?$",
    ),
    (
        "series-before-brackets",
        r"(?i)^(?P<Series>[^\[\(]+?)(?:\s|_)*(?:\(|\[)",
    ),
];

pub(crate) const COMIC_SERIES: RuleTable = &[
    (
        "series-before-issue",
        r"(?i)^(?P<Series>.+?)(?:\s|_|-)+(?:\(|\[)?(?:#|issue|v|vol\.?|volume|c|ch\.?|chapter)(?:\s|_)?\d+",
    ),
    (
        "series-before-trailing-number",
        r"(?i)^(?P<Series>.+?)(?:\s|_)+\d+(?:\.\d+)?(?:-\d+)?(?:(?:\s|_)*(?:\(|\[).*)?$",
    ),
    (
        "series-before-brackets",
        r"(?i)^(?P<Series>[^\[\(]+?)(?:\s|_)*(?:\(|\[)",
    ),
];

pub(crate) const MANGA_VOLUME: RuleTable = &[
    (
        "volume-word",
        concat!(r"(?i)(?:\b|_)(?:vol\.?|volume)(?:\s|_)?(?P<Volume>", numrange!(), ")"),
    ),
    (
        "volume-v",
        concat!(r"(?i)(?:\b|_)(?<!\[)v(?P<Volume>", numrange!(), r")(?![\d\.\]])"),
    ),
    (
        "volume-tome",
        concat!(r"(?i)(?:\b|_)tome(?:\s|_)?(?P<Volume>", numrange!(), ")"),
    ),
    ("volume-cjk-prefixed", r"第(?P<Volume>\d+(?:-\d+)?)(?:卷|册|巻|권)"),
    ("volume-cjk-suffixed", r"(?P<Volume>\d+(?:-\d+)?)(?:巻|권|卷)"),
];

pub(crate) const COMIC_VOLUME: RuleTable = &[
    (
        "volume-word",
        concat!(r"(?i)(?:\b|_)(?:vol\.?|volume)(?:\s|_)?(?P<Volume>", numrange!(), ")"),
    ),
    (
        "volume-v",
        r"(?i)(?:\b|_)(?<!\[)v(?P<Volume>\d+)(?![\d\.\]])",
    ),
];

/// Trailing number, not preceded by a volume word.
macro_rules! trailing_number {
    ($group:literal) => {
        concat!(
            r"(?i)(?<!vol)(?<!vol\.)(?<!volume)(?<!tome)(?<![\s_])(?:\s|_)+(?P<",
            $group,
            ">",
            numrange!(),
            r")(?:(?:\s|_)*(?:\(|\[)[^\)\]]*(?:\)|\]))*$"
        )
    };
}

pub(crate) const MANGA_CHAPTER: RuleTable = &[
    (
        "chapter-c",
        r"(?i)(?:\b|_)(?:c|ch)\.?(?:\s|_)?(?P<Chapter>\d+(?:\.\d+)?(?:-c?\d+(?:\.\d+)?)?)",
    ),
    (
        "chapter-word",
        concat!(r"(?i)(?:\b|_)(?:chapter|episode|ep\.?)(?:\s|_)?(?P<Chapter>", numrange!(), ")"),
    ),
    ("chapter-cjk", r"第?(?P<Chapter>\d+(?:-\d+)?)(?:话|話|화)"),
    (
        "chapter-after-dash",
        concat!(r"(?i)(?:\s|_)-(?:\s|_)+(?P<Chapter>", numrange!(), r")(?:\b|_|$)"),
    ),
    ("chapter-trailing-number", trailing_number!("Chapter")),
    ("chapter-bare-number", concat!(r"^(?P<Chapter>", numrange!(), ")$")),
];

pub(crate) const COMIC_CHAPTER: RuleTable = &[
    ("issue-hash", concat!(r"#(?P<Chapter>", numrange!(), ")")),
    (
        "issue-word",
        concat!(r"(?i)(?:\b|_)(?:issue|chapter|ch\.?|c)(?:\s|_)?(?P<Chapter>", numrange!(), ")"),
    ),
    ("issue-trailing-number", trailing_number!("Chapter")),
    ("issue-bare-number", concat!(r"^(?P<Chapter>", numrange!(), ")$")),
];

pub(crate) const EDITION: RuleTable = &[(
    "edition",
    r"(?i)(?:\b|_)(?P<Edition>omnibus(?:\s+edition)?|complete\s+(?:series|edition)|deluxe(?:\s+edition)?|full\s+colou?r(?:\s+edition)?|anniversary\s+edition|collector'?s\s+edition|uncensored)(?:\b|_|$)",
)];

pub(crate) const MANGA_SPECIAL: RuleTable = &[(
    "special-manga",
    r"(?i)(?:\b|_)(?P<Special>sp\d+|specials?|omake|extras?|one[\s_-]?shot|art[\s_-]?book|side[\s_-]?story|bonus)(?:\b|_|$)",
)];

pub(crate) const COMIC_SPECIAL: RuleTable = &[(
    "special-comic",
    r"(?i)(?:\b|_)(?P<Special>annual|one[\s_-]?shot|tpb|specials?|extras?|omake|sp\d+)(?:\b|_|$)",
)];

/// Whole-name folder classifiers.
pub(crate) const VOLUME_FOLDER: RuleTable = &[(
    "volume-folder",
    concat!(r"(?i)^(?:v|vol\.?|volume|tome)(?:\s|_)?(?P<Volume>", numrange!(), r")$"),
)];

pub(crate) const CHAPTER_FOLDER: RuleTable = &[(
    "chapter-folder",
    concat!(
        r"(?i)^(?:(?:c|ch\.?|chapter|episode|ep\.?|issue|#)(?:\s|_)?)?(?P<Chapter>",
        numrange!(),
        r")$"
    ),
)];

/// A compiled rule.
#[derive(Debug)]
pub(crate) struct Rule {
    pub name: &'static str,
    pub regex: Regex,
}

/// Every rule group, compiled with the same backtracking budget.
#[derive(Debug)]
pub(crate) struct RuleSet {
    pub manga_series: Vec<Rule>,
    pub comic_series: Vec<Rule>,
    pub manga_volume: Vec<Rule>,
    pub comic_volume: Vec<Rule>,
    pub manga_chapter: Vec<Rule>,
    pub comic_chapter: Vec<Rule>,
    pub edition: Vec<Rule>,
    pub manga_special: Vec<Rule>,
    pub comic_special: Vec<Rule>,
    pub volume_folder: Vec<Rule>,
    pub chapter_folder: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(backtrack_limit: usize) -> Result<Self, fancy_regex::Error> {
        let build = |table: RuleTable| -> Result<Vec<Rule>, fancy_regex::Error> {
            table
                .iter()
                .map(|&(name, pattern)| {
                    Ok(Rule {
                        name,
                        regex: RegexBuilder::new(pattern)
                            .backtrack_limit(backtrack_limit)
                            .build()?,
                    })
                })
                .collect()
        };

        Ok(Self {
            manga_series: build(MANGA_SERIES)?,
            comic_series: build(COMIC_SERIES)?,
            manga_volume: build(MANGA_VOLUME)?,
            comic_volume: build(COMIC_VOLUME)?,
            manga_chapter: build(MANGA_CHAPTER)?,
            comic_chapter: build(COMIC_CHAPTER)?,
            edition: build(EDITION)?,
            manga_special: build(MANGA_SPECIAL)?,
            comic_special: build(COMIC_SPECIAL)?,
            volume_folder: build(VOLUME_FOLDER)?,
            chapter_folder: build(CHAPTER_FOLDER)?,
        })
    }
}
