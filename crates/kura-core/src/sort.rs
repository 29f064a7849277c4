//! Natural ("human") string ordering.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use compact_str::CompactString;
use dashmap::DashMap;

/// One run of a split string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    /// Non-digit run, lowercased.
    Text(CompactString),
    /// Digit run with leading zeros removed ("" for zero).
    Number(CompactString),
}

/// Comparer that orders embedded digit runs numerically, so `x2 < x10`.
///
/// Splits are memoized per distinct input. One comparer is meant to live for
/// the duration of a library scan and be shared by reference across worker
/// threads; call [`NaturalSortComparer::clear`] when the scan finishes.
#[derive(Debug, Default)]
pub struct NaturalSortComparer {
    cache: DashMap<String, Arc<[Chunk]>>,
}

impl NaturalSortComparer {
    /// Create a comparer with an empty cache.
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Compare two strings. `ascending = false` reverses the order.
    pub fn compare(&self, x: &str, y: &str, ascending: bool) -> Ordering {
        let ordering = if x == y {
            Ordering::Equal
        } else {
            let left = self.chunks(x);
            let right = self.chunks(y);
            compare_chunks(&left, &right).then_with(|| x.cmp(y))
        };
        if ascending { ordering } else { ordering.reverse() }
    }

    /// Sort a slice in natural order of the path each item carries.
    pub fn sort_by_path<T, F>(&self, items: &mut [T], path: F)
    where
        F: Fn(&T) -> &Path,
    {
        items.sort_by(|a, b| {
            self.compare(&path(a).to_string_lossy(), &path(b).to_string_lossy(), true)
        });
    }

    /// Sort strings in natural order.
    pub fn order_by_natural<S: AsRef<str>>(&self, items: &mut [S]) {
        items.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref(), true));
    }

    /// Number of memoized strings.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Drop all memoized splits.
    pub fn clear(&self) {
        self.cache.clear();
    }

    fn chunks(&self, value: &str) -> Arc<[Chunk]> {
        if let Some(found) = self.cache.get(value) {
            return Arc::clone(found.value());
        }
        let split: Arc<[Chunk]> = split_runs(value).into();
        self.cache.insert(value.to_string(), Arc::clone(&split));
        split
    }
}

fn split_runs(value: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current = CompactString::default();
    let mut in_digits = false;

    for ch in value.chars() {
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != in_digits {
            chunks.push(finish_run(&current, in_digits));
            current.clear();
        }
        in_digits = is_digit;
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(finish_run(&current, in_digits));
    }
    chunks
}

fn finish_run(run: &str, digits: bool) -> Chunk {
    if digits {
        Chunk::Number(run.trim_start_matches('0').into())
    } else {
        Chunk::Text(run.to_lowercase().into())
    }
}

fn compare_chunks(left: &[Chunk], right: &[Chunk]) -> Ordering {
    for (a, b) in left.iter().zip(right.iter()) {
        let ordering = match (a, b) {
            (Chunk::Number(x), Chunk::Number(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            // Mixed runs fall back to the first character, so `!` < digits < letters.
            (Chunk::Text(x), Chunk::Number(_)) => first_char(x).cmp(&'0'),
            (Chunk::Number(_), Chunk::Text(y)) => '0'.cmp(&first_char(y)),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

fn first_char(text: &str) -> char {
    text.chars().next().unwrap_or('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(input: &[&str]) -> Vec<String> {
        let comparer = NaturalSortComparer::new();
        let mut items: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        comparer.order_by_natural(&mut items);
        items
    }

    #[test]
    fn test_numeric_runs() {
        assert_eq!(
            sorted(&["x1.jpg", "x10.jpg", "x3.jpg"]),
            vec!["x1.jpg", "x3.jpg", "x10.jpg"]
        );
    }

    #[test]
    fn test_leading_punctuation() {
        assert_eq!(sorted(&["002", "001", "!001"]), vec!["!001", "001", "002"]);
    }

    #[test]
    fn test_empty_sorts_first() {
        assert_eq!(sorted(&["a", "", "1"]), vec!["", "1", "a"]);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(sorted(&["Vol 1 Extra", "Vol 1"]), vec!["Vol 1", "Vol 1 Extra"]);
    }

    #[test]
    fn test_zero_padding_is_ignored() {
        assert_eq!(
            sorted(&["Ch 010", "Ch 9", "Ch 0001"]),
            vec!["Ch 0001", "Ch 9", "Ch 010"]
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(sorted(&["b2", "B1", "a3"]), vec!["a3", "B1", "b2"]);
    }

    #[test]
    fn test_paths_compare_segment_wise() {
        assert_eq!(
            sorted(&["Series/Vol 10/001.jpg", "Series/Vol 2/010.jpg", "Series/Vol 2/002.jpg"]),
            vec!["Series/Vol 2/002.jpg", "Series/Vol 2/010.jpg", "Series/Vol 10/001.jpg"]
        );
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        assert_eq!(
            sorted(&["a99999999999999999999999", "a100000000000000000000000"]),
            vec!["a99999999999999999999999", "a100000000000000000000000"]
        );
    }

    #[test]
    fn test_descending() {
        let comparer = NaturalSortComparer::new();
        assert_eq!(comparer.compare("x2", "x10", false), Ordering::Greater);
        assert_eq!(comparer.compare("x2", "x10", true), Ordering::Less);
    }

    #[test]
    fn test_sort_by_path() {
        let comparer = NaturalSortComparer::new();
        let mut paths = vec![
            std::path::PathBuf::from("/m/A/A v10.cbz"),
            std::path::PathBuf::from("/m/A/A v2.cbz"),
            std::path::PathBuf::from("/m/A/A v1.cbz"),
        ];
        comparer.sort_by_path(&mut paths, |p| p.as_path());
        assert_eq!(
            paths,
            vec![
                std::path::PathBuf::from("/m/A/A v1.cbz"),
                std::path::PathBuf::from("/m/A/A v2.cbz"),
                std::path::PathBuf::from("/m/A/A v10.cbz"),
            ]
        );
    }

    #[test]
    fn test_cache_lifecycle() {
        let comparer = NaturalSortComparer::new();
        comparer.compare("a1", "a2", true);
        assert_eq!(comparer.cached(), 2);
        comparer.clear();
        assert_eq!(comparer.cached(), 0);
    }
}
