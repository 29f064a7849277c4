//! Numeric ranges for volume and chapter tokens.
//!
//! Tokens follow the grammar `N`, `N-M` or `N.F`. Each side of a hyphen is
//! reduced to its numeric prefix, so `153b` reads as `153`. A token with no
//! numeric content never fails: it degrades to [`LOOSE_LEAF_VOLUME_NUMBER`].

use std::cmp::Ordering;

/// Token for chapters that are not assigned to a real volume.
pub const LOOSE_LEAF_VOLUME: &str = "0";
/// Numeric value of [`LOOSE_LEAF_VOLUME`].
pub const LOOSE_LEAF_VOLUME_NUMBER: f32 = 0.0;
/// Volume token used when a file carries no volume marker.
pub const DEFAULT_VOLUME: &str = LOOSE_LEAF_VOLUME;
/// Chapter token used when a file carries no chapter marker.
pub const DEFAULT_CHAPTER: &str = "0";
/// Numeric value of [`DEFAULT_CHAPTER`].
pub const DEFAULT_CHAPTER_NUMBER: f32 = 0.0;
/// Volume token of the specials bucket.
pub const SPECIAL_VOLUME: &str = "100000";
/// Numeric value of [`SPECIAL_VOLUME`].
pub const SPECIAL_VOLUME_NUMBER: f32 = 100_000.0;

/// A parsed `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRange {
    pub min: f32,
    pub max: f32,
    /// No side of the token had a numeric prefix.
    pub malformed: bool,
}

impl NumberRange {
    /// Parse a raw token.
    pub fn parse(token: &str) -> Self {
        let mut min: Option<f32> = None;
        let mut max: Option<f32> = None;

        for side in token.split('-').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(value) = numeric_prefix(side) {
                min = Some(min.map_or(value, |m| m.min(value)));
                max = Some(max.map_or(value, |m| m.max(value)));
            }
        }

        match (min, max) {
            (Some(min), Some(max)) => Self {
                min,
                max,
                malformed: false,
            },
            _ => {
                if !token.trim().is_empty() {
                    tracing::debug!(token, "malformed range token, using loose-leaf sentinel");
                }
                Self {
                    min: LOOSE_LEAF_VOLUME_NUMBER,
                    max: LOOSE_LEAF_VOLUME_NUMBER,
                    malformed: true,
                }
            }
        }
    }

    /// Whether min and max are the same number.
    pub fn is_single(&self) -> bool {
        self.min == self.max
    }

    /// Canonical display string, e.g. `3` or `2.5-4`.
    pub fn display(&self) -> String {
        if self.is_single() {
            format_number(self.min)
        } else {
            format!("{}-{}", format_number(self.min), format_number(self.max))
        }
    }
}

/// Lowest number of a range token.
pub fn min_number_from_range(token: &str) -> f32 {
    NumberRange::parse(token).min
}

/// Highest number of a range token.
pub fn max_number_from_range(token: &str) -> f32 {
    NumberRange::parse(token).max
}

/// Format a number without a trailing `.0`.
pub fn format_number(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.3}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Whether the number is the loose-leaf sentinel.
pub fn is_loose_leaf(number: f32) -> bool {
    number == LOOSE_LEAF_VOLUME_NUMBER
}

/// Whether the number is the specials sentinel.
pub fn is_special_volume(number: f32) -> bool {
    number == SPECIAL_VOLUME_NUMBER
}

/// Ordering for volume numbers: real volumes ascending, then loose-leaf, then specials.
pub fn compare_volume_numbers(a: f32, b: f32) -> Ordering {
    volume_class(a)
        .cmp(&volume_class(b))
        .then_with(|| a.total_cmp(&b))
}

fn volume_class(number: f32) -> u8 {
    if is_special_volume(number) {
        2
    } else if is_loose_leaf(number) {
        1
    } else {
        0
    }
}

/// Digits with at most one decimal point, after an optional `c`/`v`/`#` marker.
fn numeric_prefix(side: &str) -> Option<f32> {
    let side = side.trim_start_matches(['c', 'C', 'v', 'V', '#']);
    let mut end = 0;
    let mut seen_dot = false;
    for (idx, ch) in side.char_indices() {
        if ch.is_ascii_digit() {
            end = idx + 1;
        } else if ch == '.' && !seen_dot && end == idx && idx > 0 {
            seen_dot = true;
        } else {
            break;
        }
    }
    if end == 0 {
        return None;
    }
    side[..end].parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_range() {
        assert_eq!(min_number_from_range("3-5"), 3.0);
        assert_eq!(max_number_from_range("3-5"), 5.0);
        assert_eq!(min_number_from_range("12"), 12.0);
        assert_eq!(max_number_from_range("12"), 12.0);
    }

    #[test]
    fn test_decimal_and_suffix() {
        assert_eq!(min_number_from_range("2.5"), 2.5);
        assert_eq!(min_number_from_range("153b"), 153.0);
        assert_eq!(max_number_from_range("000-006"), 6.0);
        assert_eq!(min_number_from_range("1.5-2.5"), 1.5);
        assert_eq!(min_number_from_range("c001-c005"), 1.0);
        assert_eq!(max_number_from_range("c001-c005"), 5.0);
    }

    #[test]
    fn test_trailing_dot_is_ignored() {
        assert_eq!(min_number_from_range("12."), 12.0);
    }

    #[test]
    fn test_malformed_degrades_to_sentinel() {
        let range = NumberRange::parse("Some special");
        assert!(range.malformed);
        assert_eq!(range.min, LOOSE_LEAF_VOLUME_NUMBER);
        assert_eq!(min_number_from_range(""), LOOSE_LEAF_VOLUME_NUMBER);
        assert_eq!(min_number_from_range("-"), LOOSE_LEAF_VOLUME_NUMBER);
    }

    #[test]
    fn test_reversed_range_is_ordered() {
        assert_eq!(min_number_from_range("5-3"), 3.0);
        assert_eq!(max_number_from_range("5-3"), 5.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(NumberRange::parse("000-006").display(), "0-6");
        assert_eq!(NumberRange::parse("06").display(), "6");
        assert_eq!(NumberRange::parse("2.5").display(), "2.5");
        assert_eq!(format_number(10.0), "10");
    }

    #[test]
    fn test_volume_ordering_puts_sentinels_last() {
        let mut numbers = vec![SPECIAL_VOLUME_NUMBER, 0.0, 3.0, 1.0];
        numbers.sort_by(|a, b| compare_volume_numbers(*a, *b));
        assert_eq!(numbers, vec![1.0, 3.0, 0.0, SPECIAL_VOLUME_NUMBER]);
    }
}
