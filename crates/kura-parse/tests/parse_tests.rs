use std::path::Path;

use kura_core::range::{DEFAULT_CHAPTER, DEFAULT_VOLUME, SPECIAL_VOLUME};
use kura_core::{IssueKind, LibraryType, MangaFormat};
use kura_parse::{FilenameParser, normalize};
use rstest::rstest;

fn parse(path: &str, library_type: LibraryType) -> kura_core::ParsedInfo {
    let root = match library_type {
        LibraryType::Comic => "/comics",
        LibraryType::Image => "/images",
        _ => "/manga",
    };
    FilenameParser::default().parse(&Path::new(root).join(path), Path::new(root), library_type)
}

#[rstest]
#[case(
    "Cynthia The Mission/Cynthia The Mission - c000-006 (v06) [Desudesu&Brolen].zip",
    "Cynthia The Mission",
    "06",
    "000-006"
)]
#[case("Beelzebub/Beelzebub_01_[Noodles].zip", "Beelzebub", DEFAULT_VOLUME, "01")]
#[case(
    "Akame ga KILL/Akame ga KILL! ZERO v01 (2016) (Digital).cbz",
    "Akame ga KILL! ZERO",
    "01",
    DEFAULT_CHAPTER
)]
#[case("Vagabond/Vagabond Vol. 03 Ch. 021.5.cbz", "Vagabond", "03", "021.5")]
#[case("One Piece/One Piece - 1000.cbz", "One Piece", DEFAULT_VOLUME, "1000")]
#[case("Series/Vol 01/Chapter 003.cbz", "Series", "01", "003")]
#[case("Kenichi/Kenichi Omnibus v02.cbz", "Kenichi", "02", DEFAULT_CHAPTER)]
#[case("Series/Series.epub", "Series", DEFAULT_VOLUME, DEFAULT_CHAPTER)]
#[case("幽游白书/幽游白书完全版 第03卷.epub", "幽游白书完全版", "03", DEFAULT_CHAPTER)]
fn test_manga_corpus(
    #[case] path: &str,
    #[case] series: &str,
    #[case] volumes: &str,
    #[case] chapters: &str,
) {
    let info = parse(path, LibraryType::Manga);
    assert_eq!(info.series, series, "series of {path}");
    assert_eq!(info.volumes, volumes, "volumes of {path}");
    assert_eq!(info.chapters, chapters, "chapters of {path}");
    assert!(!info.is_special, "{path} should not be special");
}

#[rstest]
#[case("Batman/Batman #012 (2016).cbz", "Batman", DEFAULT_VOLUME, "012")]
#[case("Saga/Saga v2 #13.cbr", "Saga", "2", "13")]
fn test_comic_corpus(
    #[case] path: &str,
    #[case] series: &str,
    #[case] volumes: &str,
    #[case] chapters: &str,
) {
    let info = parse(path, LibraryType::Comic);
    assert_eq!(info.series, series);
    assert_eq!(info.volumes, volumes);
    assert_eq!(info.chapters, chapters);
}

#[rstest]
#[case("Beelzebub/Specials/Beelzebub Omake.cbz", LibraryType::Manga, "Beelzebub")]
#[case("Darker than Black/Darker than Black - SP01.cbz", LibraryType::Manga, "Darker than Black")]
#[case("Watchmen/Watchmen TPB.cbz", LibraryType::Comic, "Watchmen")]
fn test_specials(#[case] path: &str, #[case] library_type: LibraryType, #[case] series: &str) {
    let info = parse(path, library_type);
    assert!(info.is_special, "{path} should be special");
    assert_eq!(info.series, series);
    assert_eq!(info.volumes, SPECIAL_VOLUME);
    assert_eq!(info.chapters, DEFAULT_CHAPTER);
    assert!(!info.title.is_empty());
}

#[test]
fn test_special_title_is_identity() {
    let info = parse("Darker than Black/Darker than Black - SP01.cbz", LibraryType::Manga);
    assert_eq!(info.title, "Darker than Black - SP01");
    assert_eq!(info.range_key(), "Darker than Black - SP01");
}

#[test]
fn test_edition_is_recorded() {
    let info = parse("Kenichi/Kenichi Omnibus v02.cbz", LibraryType::Manga);
    assert_eq!(info.edition, "Omnibus");
}

#[test]
fn test_cynthia_metadata() {
    let info = parse(
        "Cynthia The Mission/Cynthia The Mission - c000-006 (v06) [Desudesu&Brolen].zip",
        LibraryType::Manga,
    );
    assert_eq!(info.format, MangaFormat::Archive);
    assert_eq!(info.filename, "Cynthia The Mission - c000-006 (v06) [Desudesu&Brolen].zip");
    assert_eq!(info.title, "Cynthia The Mission - c000-006 (v06)");
}

#[test]
fn test_image_library_uses_folders() {
    let info = parse("Series/Vol 02/Chapter 5/001.jpg", LibraryType::Image);
    assert_eq!(info.series, "Series");
    assert_eq!(info.volumes, "02");
    assert_eq!(info.chapters, "5");
    assert_eq!(info.format, MangaFormat::Image);
}

#[test]
fn test_images_in_series_folder_share_a_chapter() {
    let first = parse("Series/001.jpg", LibraryType::Image);
    let second = parse("Series/002.jpg", LibraryType::Image);
    assert_eq!(first.series, "Series");
    assert_eq!(first.range_key(), second.range_key());
    assert_eq!(first.volume_key(), second.volume_key());
}

#[test]
fn test_unrecognized_file_still_produces_info() {
    let parser = FilenameParser::default();
    let outcome = parser.parse_with_diagnostics(
        Path::new("/manga/Series/readme.txt"),
        Path::new("/manga"),
        LibraryType::Manga,
    );
    assert_eq!(outcome.info.format, MangaFormat::Unknown);
    assert!(!outcome.info.series.is_empty());
    assert_eq!(outcome.info.volumes, DEFAULT_VOLUME);
    assert_eq!(outcome.info.chapters, DEFAULT_CHAPTER);
    assert!(
        outcome
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::ParseFailed)
    );
}

#[test]
fn test_ambiguity_is_reported_when_enabled() {
    let path = Path::new("/manga/Series/Series v01 003.cbz");
    let root = Path::new("/manga");

    let quiet = FilenameParser::default().parse_with_diagnostics(path, root, LibraryType::Manga);
    assert!(quiet.issues.is_empty());

    let checked = FilenameParser::default()
        .with_ambiguity_checks(true)
        .parse_with_diagnostics(path, root, LibraryType::Manga);
    assert_eq!(checked.info, quiet.info);
    assert_eq!(checked.info.series, "Series");
    assert!(
        checked
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::ParseAmbiguous)
    );
}

#[test]
fn test_parse_is_deterministic() {
    let parser = FilenameParser::default();
    let path = Path::new("/manga/Vagabond/Vagabond Vol. 03 Ch. 021.5.cbz");
    let first = parser.parse(path, Path::new("/manga"), LibraryType::Manga);
    let second = parser.parse(path, Path::new("/manga"), LibraryType::Manga);
    assert_eq!(first, second);
}

#[rstest]
#[case("Cynthia The Mission")]
#[case("Akame ga KILL! ZERO")]
#[case("幽游白书完全版")]
#[case("Pokémon: Special Edition!!")]
fn test_normalize_idempotent_on_series(#[case] name: &str) {
    let once = normalize(name);
    assert_eq!(normalize(&once), once);
}

#[test]
fn test_grouping_key_ignores_case_and_punctuation() {
    assert_eq!(normalize("Akame ga KILL! ZERO"), normalize("akame-ga-kill zero"));
}
