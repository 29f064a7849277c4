//! Title cleaning and identity normalization.

use std::sync::LazyLock;

use kura_core::MangaFormat;
use regex::{Captures, Regex};

regex!(SQUARE_TAG, r"\[[^\]]*\]");
regex!(CURLY_TAG, r"\{[^\}]*\}");
regex!(ROUND_TAG, r"\(([^\)]*)\)");
regex!(MARKER_IN_TAG, r"(?i)^\s*(?:v|vol\.?|volume|c|ch\.?|chapter|#)\s*\d");
regex!(
    SPECIAL_MARKER,
    r"(?i)(?:^|\b|_)(?:sp\d+|specials?|omake|extras?|one[\s_-]?shot|art[\s_-]?book|side[\s_-]?story|bonus|annual|tpb)(?:\b|_|$)"
);
regex!(WHITESPACE, r"\s+");
regex!(
    STRUCTURAL_TOKEN,
    r"(?i)(?:^|\b|_)(?:v|vol\.?|volume|tome|c|ch\.?|chapter|episode|ep\.?|issue)?(?:\s|_)*#?\d+(?:\.\d+)?(?:-\d+(?:\.\d+)?)?"
);
regex!(
    MARKER_WORD,
    r"(?i)^(?:v|vol\.?|volume|tome|c|ch\.?|chapter|episode|ep\.?|issue|#)$"
);

/// Strip a recognized media extension.
pub fn remove_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 && MangaFormat::from_extension(&name[idx + 1..]) != MangaFormat::Unknown => {
            &name[..idx]
        }
        _ => name,
    }
}

/// Turn a file or folder name into a display title.
///
/// Release tags in `[...]` and `{...}` are removed along with underscores.
/// A `(...)` group survives only when it carries a volume or chapter marker,
/// or when cleaning a special, where the parenthetical is part of its identity.
/// Never returns an empty string for a non-empty input.
pub fn clean_title(name: &str, is_special: bool) -> String {
    let stem = remove_extension(name);
    let spaced = stem.replace('_', " ");
    let without_square = SQUARE_TAG.replace_all(&spaced, " ");
    let without_curly = CURLY_TAG.replace_all(&without_square, " ");
    let without_round = if is_special {
        without_curly.into_owned()
    } else {
        ROUND_TAG
            .replace_all(&without_curly, |caps: &Captures| {
                if MARKER_IN_TAG.is_match(&caps[1]) {
                    caps[0].to_string()
                } else {
                    " ".to_string()
                }
            })
            .into_owned()
    };

    let cleaned = tidy(&without_round);
    if !cleaned.is_empty() {
        return cleaned;
    }
    let fallback = tidy(&spaced);
    if fallback.is_empty() {
        name.trim().to_string()
    } else {
        fallback
    }
}

/// Remove special-content markers (`SP01`, `Omake`, ...) from a name.
pub fn strip_special_markers(name: &str) -> String {
    tidy(&SPECIAL_MARKER.replace_all(name, " "))
}

/// Whether a name is nothing but volume/chapter markers and numbers.
pub(crate) fn is_structural_only(name: &str) -> bool {
    let leftover = tidy(&STRUCTURAL_TOKEN.replace_all(name, " "));
    leftover.is_empty() || MARKER_WORD.is_match(&leftover) || !leftover.chars().any(char::is_alphanumeric)
}

/// Collapse whitespace and trim separator debris from the ends.
pub(crate) fn tidy(value: &str) -> String {
    WHITESPACE
        .replace_all(value, " ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | ',' | ':' | '~'))
        .to_string()
}

/// Grouping key for series names.
///
/// Lowercases, folds common Latin diacritics and drops everything that is not
/// alphanumeric. Lossy and idempotent.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        for lower in ch.to_lowercase() {
            if !lower.is_alphanumeric() {
                continue;
            }
            match fold_diacritic(lower) {
                Some(folded) => out.push_str(folded),
                None => out.push(lower),
            }
        }
    }
    out
}

fn fold_diacritic(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_extension() {
        assert_eq!(remove_extension("Series v01.cbz"), "Series v01");
        assert_eq!(remove_extension("Series Vol. 1"), "Series Vol. 1");
        assert_eq!(remove_extension(".cbz"), ".cbz");
    }

    #[test]
    fn test_clean_title_strips_release_tags() {
        assert_eq!(
            clean_title("Cynthia The Mission - c000-006 (v06) [Desudesu&Brolen].zip", false),
            "Cynthia The Mission - c000-006 (v06)"
        );
        assert_eq!(
            clean_title("[Hidoi]_Amaenaideyo_MS_vol01_chp02.rar", false),
            "Amaenaideyo MS vol01 chp02"
        );
        assert_eq!(clean_title("Beelzebub (2009) {Digital}.cbz", false), "Beelzebub");
    }

    #[test]
    fn test_clean_title_keeps_special_parenthetical() {
        assert_eq!(
            clean_title("Tenjou Tenge (Art Book) [Group].cbz", true),
            "Tenjou Tenge (Art Book)"
        );
    }

    #[test]
    fn test_clean_title_never_empty() {
        assert_eq!(clean_title("[Group].cbz", false), "[Group]");
        assert_eq!(clean_title("___", false), "___");
    }

    #[test]
    fn test_strip_special_markers() {
        assert_eq!(strip_special_markers("Darker than Black - SP01"), "Darker than Black");
        assert_eq!(strip_special_markers("Beelzebub Omake"), "Beelzebub");
    }

    #[test]
    fn test_structural_only() {
        assert!(is_structural_only("Vol 01"));
        assert!(is_structural_only("Chapter 5"));
        assert!(is_structural_only("003"));
        assert!(is_structural_only("Vol"));
        assert!(is_structural_only("v01 c02"));
        assert!(!is_structural_only("Beelzebub"));
        assert!(!is_structural_only("Mob Psycho 100"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Kaguya-sama: Love Is War"), "kaguyasamaloveiswar");
        assert_eq!(normalize("Pokémon Adventures"), "pokemonadventures");
        assert_eq!(normalize("ÆON FLUX"), "aeonflux");
        assert_eq!(normalize("進撃の巨人"), "進撃の巨人");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in [
            "Kaguya-sama: Love Is War",
            "Pokémon Adventures",
            "İstanbul Şehri",
            "Straße ½ Ⅻ",
            "  __--  ",
            "進撃の巨人 第03卷",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {input}");
        }
    }
}
