//! File path → [`ParsedInfo`].

use std::path::{Component, Path};

use kura_core::range::{DEFAULT_CHAPTER, DEFAULT_VOLUME, SPECIAL_VOLUME};
use kura_core::{IssueKind, LibraryType, MangaFormat, ParsedInfo, ParserSettings, ScanIssue};
use tracing::{debug, info, warn};

use crate::clean::{clean_title, is_structural_only, remove_extension, strip_special_markers, tidy};
use crate::rules::{Rule, RuleSet};

/// Folder names that mark their contents as specials.
const SPECIALS_FOLDERS: &[&str] = &["specials", "special", "extras", "omake"];

/// Result of a parse together with the issues it raised.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub info: ParsedInfo,
    pub issues: Vec<ScanIssue>,
}

/// Values supplied by metadata embedded in a file (ComicInfo and similar).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataHints {
    pub series: Option<String>,
    pub localized_series: Option<String>,
    pub volume: Option<String>,
    pub chapter: Option<String>,
}

impl MetadataHints {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.series.is_none()
            && self.localized_series.is_none()
            && self.volume.is_none()
            && self.chapter.is_none()
    }

    /// Overlay the hints onto a parsed file. Specials keep their sentinel numbers.
    pub fn apply(&self, info: &mut ParsedInfo) {
        if let Some(series) = non_blank(&self.series) {
            info.series = series.to_string();
        }
        if let Some(localized) = non_blank(&self.localized_series) {
            info.localized_series = Some(localized.to_string());
        }
        if info.is_special {
            return;
        }
        if let Some(volume) = non_blank(&self.volume) {
            info.volumes = volume.to_string();
        }
        if let Some(chapter) = non_blank(&self.chapter) {
            info.chapters = chapter.to_string();
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Reads [`MetadataHints`] for a file.
pub trait MetadataSource: Send + Sync {
    fn hints(&self, path: &Path) -> Option<MetadataHints>;
}

/// What a folder name says about the files below it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FolderKind {
    Specials,
    Volume(String),
    Chapter(String),
    Plain,
}

/// Tokens pulled out of one name.
#[derive(Debug, Default)]
struct NameFields {
    series: Option<String>,
    volumes: Option<String>,
    chapters: Option<String>,
    edition: Option<String>,
    special_marker: bool,
}

impl NameFields {
    fn matched_nothing(&self) -> bool {
        self.series.is_none()
            && self.volumes.is_none()
            && self.chapters.is_none()
            && self.edition.is_none()
            && !self.special_marker
    }
}

struct Diagnostics<'a> {
    path: &'a Path,
    check_ambiguity: bool,
    issues: Vec<ScanIssue>,
}

struct Groups<'a> {
    series: &'a [Rule],
    volume: &'a [Rule],
    chapter: &'a [Rule],
    special: &'a [Rule],
}

/// Parses file paths with the ordered rule cascade.
///
/// A parser is immutable and can be shared across threads.
#[derive(Debug)]
pub struct FilenameParser {
    rules: RuleSet,
    settings: ParserSettings,
    report_ambiguity: bool,
}

impl Default for FilenameParser {
    fn default() -> Self {
        Self::new(ParserSettings::default())
    }
}

impl FilenameParser {
    /// Compile the rule cascade.
    ///
    /// # Panics
    ///
    /// Panics if a built-in rule pattern fails to compile.
    pub fn new(settings: ParserSettings) -> Self {
        let rules = RuleSet::compile(settings.backtrack_limit)
            .expect("built-in filename rules must compile");
        Self {
            rules,
            settings,
            report_ambiguity: false,
        }
    }

    /// Also report names where a later rule disagrees with the winning one.
    pub fn with_ambiguity_checks(mut self, enabled: bool) -> Self {
        self.report_ambiguity = enabled;
        self
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    /// Parse a file under `root`. Never fails.
    pub fn parse(&self, full_path: &Path, root: &Path, library_type: LibraryType) -> ParsedInfo {
        self.parse_with_diagnostics(full_path, root, library_type).info
    }

    /// Parse a file and collect the issues raised along the way.
    pub fn parse_with_diagnostics(
        &self,
        full_path: &Path,
        root: &Path,
        library_type: LibraryType,
    ) -> ParseOutcome {
        let mut diag = Diagnostics {
            path: full_path,
            check_ambiguity: self.report_ambiguity,
            issues: Vec::new(),
        };

        let filename = full_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = self.truncate(remove_extension(&filename));
        let folders = folder_chain(full_path, root);
        let comic = library_type.is_comic();
        let image = library_type == LibraryType::Image
            || MangaFormat::from_path(full_path) == MangaFormat::Image;

        let info = match folders.split_last() {
            Some((nearest, above)) if image => {
                let nearest = self.truncate(nearest);
                self.assemble(full_path, &nearest, true, above, comic, &mut diag)
            }
            _ => self.assemble(full_path, &stem, false, &folders, comic, &mut diag),
        };

        debug!(
            path = %full_path.display(),
            series = %info.series,
            volumes = %info.volumes,
            chapters = %info.chapters,
            special = info.is_special,
            "parsed file"
        );

        ParseOutcome {
            info,
            issues: diag.issues,
        }
    }

    /// Series name carried by a bare name, if any rule finds one.
    pub fn parse_series(&self, name: &str, library_type: LibraryType) -> Option<String> {
        let mut diag = Diagnostics::quiet(Path::new(name));
        self.series_from_name(name, self.groups(library_type.is_comic()).series, &mut diag)
    }

    /// Volume token of a bare name, or the default sentinel.
    pub fn parse_volume(&self, name: &str, library_type: LibraryType) -> String {
        let mut diag = Diagnostics::quiet(Path::new(name));
        let rules = self.groups(library_type.is_comic()).volume;
        self.first_match(rules, name, "Volume", &mut diag)
            .unwrap_or_else(|| DEFAULT_VOLUME.to_string())
    }

    /// Chapter token of a bare name, or the default sentinel.
    pub fn parse_chapter(&self, name: &str, library_type: LibraryType) -> String {
        let mut diag = Diagnostics::quiet(Path::new(name));
        let rules = self.groups(library_type.is_comic()).chapter;
        self.first_match(rules, name, "Chapter", &mut diag)
            .unwrap_or_else(|| DEFAULT_CHAPTER.to_string())
    }

    /// Edition marker in a bare name, e.g. `Omnibus`.
    pub fn parse_edition(&self, name: &str) -> Option<String> {
        let mut diag = Diagnostics::quiet(Path::new(name));
        self.first_match(&self.rules.edition, name, "Edition", &mut diag)
    }

    /// Whether a bare name carries a special marker.
    pub fn has_special_marker(&self, name: &str, library_type: LibraryType) -> bool {
        let mut diag = Diagnostics::quiet(Path::new(name));
        let rules = self.groups(library_type.is_comic()).special;
        self.first_match(rules, name, "Special", &mut diag).is_some()
    }

    fn groups(&self, comic: bool) -> Groups<'_> {
        if comic {
            Groups {
                series: &self.rules.comic_series,
                volume: &self.rules.comic_volume,
                chapter: &self.rules.comic_chapter,
                special: &self.rules.comic_special,
            }
        } else {
            Groups {
                series: &self.rules.manga_series,
                volume: &self.rules.manga_volume,
                chapter: &self.rules.manga_chapter,
                special: &self.rules.manga_special,
            }
        }
    }

    fn truncate(&self, name: &str) -> String {
        if name.chars().count() <= self.settings.max_name_len {
            return name.to_string();
        }
        debug!(name, limit = self.settings.max_name_len, "truncating long name");
        name.chars().take(self.settings.max_name_len).collect()
    }

    /// Build the info for `name`, which is the file stem, or the nearest
    /// folder when the file is a loose image. `folders` are the folders above it.
    fn assemble(
        &self,
        full_path: &Path,
        name: &str,
        name_is_folder: bool,
        folders: &[String],
        comic: bool,
        diag: &mut Diagnostics<'_>,
    ) -> ParsedInfo {
        let groups = self.groups(comic);
        let fields = self.parse_name(name, &groups, diag);
        let name_kind = if name_is_folder {
            self.classify_folder(name, diag)
        } else {
            FolderKind::Plain
        };

        let in_specials_folder = name_kind == FolderKind::Specials
            || folders
                .iter()
                .any(|f| self.classify_folder(f, diag) == FolderKind::Specials);
        let is_special = in_specials_folder
            || (fields.special_marker && fields.volumes.is_none() && fields.chapters.is_none());

        let folder_series = self.folder_series(folders, &groups, diag);
        let series = if name_kind != FolderKind::Plain || (in_specials_folder && folder_series.is_some()) {
            folder_series.clone()
        } else {
            None
        };
        let series = series
            .or_else(|| fields.series.clone())
            .or_else(|| {
                let cleaned = clean_title(name, false);
                let cleaned = if fields.special_marker {
                    strip_special_markers(&cleaned)
                } else {
                    cleaned
                };
                (!is_structural_only(&cleaned)).then_some(cleaned)
            })
            .or(folder_series)
            .unwrap_or_else(|| clean_title(name, false));

        let mut info = ParsedInfo::new(strip_edition(&series, fields.edition.as_deref()), full_path);
        info.edition = fields.edition.clone().unwrap_or_default();
        info.is_special = is_special;
        info.title = clean_title(name, is_special);

        if is_special {
            info.volumes = SPECIAL_VOLUME.to_string();
            info.chapters = DEFAULT_CHAPTER.to_string();
        } else {
            info.volumes = fields
                .volumes
                .clone()
                .or_else(|| self.folder_volume(folders, &groups, diag))
                .unwrap_or_else(|| DEFAULT_VOLUME.to_string());
            info.chapters = fields
                .chapters
                .clone()
                .or_else(|| self.folder_chapter(folders, diag))
                .unwrap_or_else(|| DEFAULT_CHAPTER.to_string());
        }

        if !name_is_folder && fields.matched_nothing() {
            warn!(path = %full_path.display(), "no filename rule matched, using fallback");
            diag.issues.push(ScanIssue::parse_failed(
                full_path,
                format!("No rule matched `{name}`; grouped as `{}`", info.series),
            ));
        }
        info
    }

    fn parse_name(&self, name: &str, groups: &Groups<'_>, diag: &mut Diagnostics<'_>) -> NameFields {
        NameFields {
            series: self.series_from_name(name, groups.series, diag),
            volumes: self.first_match(groups.volume, name, "Volume", diag),
            chapters: self.first_match(groups.chapter, name, "Chapter", diag),
            edition: self.first_match(&self.rules.edition, name, "Edition", diag),
            special_marker: self.first_match(groups.special, name, "Special", diag).is_some(),
        }
    }

    fn series_from_name(&self, name: &str, rules: &[Rule], diag: &mut Diagnostics<'_>) -> Option<String> {
        self.first_match(rules, name, "Series", diag)
            .map(|s| clean_title(&s, false))
            .filter(|s| !is_structural_only(s))
    }

    fn classify_folder(&self, name: &str, diag: &mut Diagnostics<'_>) -> FolderKind {
        if SPECIALS_FOLDERS.iter().any(|s| name.trim().eq_ignore_ascii_case(s)) {
            return FolderKind::Specials;
        }
        if let Some(volume) = self.first_match(&self.rules.volume_folder, name.trim(), "Volume", diag) {
            return FolderKind::Volume(volume);
        }
        if let Some(chapter) = self.first_match(&self.rules.chapter_folder, name.trim(), "Chapter", diag) {
            return FolderKind::Chapter(chapter);
        }
        FolderKind::Plain
    }

    /// Series of the nearest plain folder.
    fn folder_series(&self, folders: &[String], groups: &Groups<'_>, diag: &mut Diagnostics<'_>) -> Option<String> {
        for folder in folders.iter().rev() {
            if self.classify_folder(folder, diag) != FolderKind::Plain {
                continue;
            }
            let folder = self.truncate(folder);
            let series = self.series_from_name(&folder, groups.series, diag).or_else(|| {
                let cleaned = clean_title(&folder, false);
                (!is_structural_only(&cleaned)).then_some(cleaned)
            });
            if series.is_some() {
                return series;
            }
        }
        None
    }

    /// Volume carried by the folders between the file and its series folder.
    fn folder_volume(&self, folders: &[String], groups: &Groups<'_>, diag: &mut Diagnostics<'_>) -> Option<String> {
        for folder in folders.iter().rev() {
            match self.classify_folder(folder, diag) {
                FolderKind::Volume(volume) => return Some(volume),
                FolderKind::Plain => {
                    return self.first_match(groups.volume, &self.truncate(folder), "Volume", diag);
                }
                _ => {}
            }
        }
        None
    }

    /// Chapter carried by a chapter folder between the file and its series folder.
    fn folder_chapter(&self, folders: &[String], diag: &mut Diagnostics<'_>) -> Option<String> {
        for folder in folders.iter().rev() {
            match self.classify_folder(folder, diag) {
                FolderKind::Chapter(chapter) => return Some(chapter),
                FolderKind::Plain => return None,
                _ => {}
            }
        }
        None
    }

    /// First rule in `rules` whose `group` capture matches `text`.
    fn first_match(
        &self,
        rules: &[Rule],
        text: &str,
        group: &'static str,
        diag: &mut Diagnostics<'_>,
    ) -> Option<String> {
        let mut winner: Option<(&'static str, String)> = None;
        for rule in rules {
            let token = match rule.regex.captures(text) {
                Ok(Some(caps)) => caps
                    .name(group)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty()),
                Ok(None) => None,
                Err(err) => {
                    warn!(
                        rule = rule.name,
                        path = %diag.path.display(),
                        error = %err,
                        "filename rule gave up, treating as no match"
                    );
                    diag.issues.push(ScanIssue::parse_failed(
                        diag.path,
                        format!("Rule `{}` exceeded its match budget: {err}", rule.name),
                    ));
                    None
                }
            };
            let Some(token) = token else {
                continue;
            };

            let Some((won_by, value)) = winner.as_ref() else {
                winner = Some((rule.name, token));
                if !diag.check_ambiguity {
                    break;
                }
                continue;
            };
            if *value != token {
                info!(
                    path = %diag.path.display(),
                    group,
                    winner = won_by,
                    other = rule.name,
                    "ambiguous filename, earliest rule wins"
                );
                diag.issues.push(ScanIssue::new(
                    diag.path,
                    format!(
                        "{group}: `{won_by}` matched `{value}`, `{}` would match `{token}`",
                        rule.name
                    ),
                    IssueKind::ParseAmbiguous,
                ));
                break;
            }
        }
        winner.map(|(_, token)| token)
    }
}

impl<'a> Diagnostics<'a> {
    fn quiet(path: &'a Path) -> Self {
        Self {
            path,
            check_ambiguity: false,
            issues: Vec::new(),
        }
    }
}

/// Folder names from the library root down to the file's parent.
fn folder_chain(full_path: &Path, root: &Path) -> Vec<String> {
    let Some(parent) = full_path.parent() else {
        return Vec::new();
    };
    match parent.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                _ => None,
            })
            .collect(),
        Err(_) => parent
            .file_name()
            .map(|n| vec![n.to_string_lossy().to_string()])
            .unwrap_or_default(),
    }
}

fn strip_edition(series: &str, edition: Option<&str>) -> String {
    match edition {
        Some(edition) if !edition.is_empty() => {
            let stripped = tidy(&series.replace(edition, " "));
            if stripped.is_empty() {
                series.to_string()
            } else {
                stripped
            }
        }
        _ => series.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FilenameParser {
        FilenameParser::default()
    }

    #[test]
    fn test_folder_chain() {
        assert_eq!(
            folder_chain(Path::new("/lib/A/Vol 1/x.cbz"), Path::new("/lib")),
            vec!["A", "Vol 1"]
        );
        assert!(folder_chain(Path::new("/lib/x.cbz"), Path::new("/lib")).is_empty());
        assert_eq!(folder_chain(Path::new("/other/B/x.cbz"), Path::new("/lib")), vec!["B"]);
    }

    #[test]
    fn test_classify_folder() {
        let parser = parser();
        let mut diag = Diagnostics::quiet(Path::new("x"));
        assert_eq!(parser.classify_folder("Specials", &mut diag), FolderKind::Specials);
        assert_eq!(parser.classify_folder("omake", &mut diag), FolderKind::Specials);
        assert_eq!(
            parser.classify_folder("Vol. 03", &mut diag),
            FolderKind::Volume("03".to_string())
        );
        assert_eq!(
            parser.classify_folder("Chapter 12.5", &mut diag),
            FolderKind::Chapter("12.5".to_string())
        );
        assert_eq!(parser.classify_folder("Beelzebub", &mut diag), FolderKind::Plain);
    }

    #[test]
    fn test_strip_edition() {
        assert_eq!(strip_edition("Beelzebub Omnibus", Some("Omnibus")), "Beelzebub");
        assert_eq!(strip_edition("Omnibus", Some("Omnibus")), "Omnibus");
        assert_eq!(strip_edition("Beelzebub", None), "Beelzebub");
    }

    #[test]
    fn test_hints_override() {
        let mut info = ParsedInfo::new("Shingeki", "/m/Shingeki v01.cbz").with_volumes("01");
        MetadataHints {
            series: Some("Attack on Titan".to_string()),
            localized_series: Some("進撃の巨人".to_string()),
            volume: None,
            chapter: Some(" ".to_string()),
        }
        .apply(&mut info);
        assert_eq!(info.series, "Attack on Titan");
        assert_eq!(info.localized_series.as_deref(), Some("進撃の巨人"));
        assert_eq!(info.volumes, "01");
        assert_eq!(info.chapters, DEFAULT_CHAPTER);
    }

    #[test]
    fn test_tiny_budget_degrades_without_panicking() {
        let parser = FilenameParser::new(ParserSettings {
            backtrack_limit: 1,
            max_name_len: 255,
        });
        let name = format!("{} v01.cbz", "a ".repeat(100));
        let outcome = parser.parse_with_diagnostics(
            &Path::new("/lib").join(&name),
            Path::new("/lib"),
            LibraryType::Manga,
        );
        assert!(!outcome.info.series.is_empty());
    }

    #[test]
    fn test_long_names_are_truncated() {
        let parser = FilenameParser::new(ParserSettings {
            backtrack_limit: 100_000,
            max_name_len: 16,
        });
        let name = format!("Short Series v01 {}.cbz", "x".repeat(500));
        let info = parser.parse(&Path::new("/lib").join(&name), Path::new("/lib"), LibraryType::Manga);
        assert_eq!(info.series, "Short Series");
        assert!(info.title.chars().count() <= 16);
    }
}
