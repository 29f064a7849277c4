//! Zip-backed page counting, covers and ComicInfo hints.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;
use zip::ZipArchive;

use kura_core::{MangaFormat, NaturalSortComparer};
use kura_parse::{MetadataHints, MetadataSource};
use kura_reconcile::BookInspector;

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| e == "zip" || e == "cbz")
}

fn open_zip(path: &Path) -> io::Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file)).map_err(io::Error::other)
}

/// Image entries of an archive in reading order.
fn image_entries(archive: &ZipArchive<BufReader<File>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && !name.starts_with("__MACOSX"))
        .filter(|name| MangaFormat::from_path(name) == MangaFormat::Image)
        .map(str::to_string)
        .collect();
    NaturalSortComparer::new().order_by_natural(&mut names);
    names
}

/// Reads zip and cbz archives. Other archive kinds and books report no pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipInspector;

impl BookInspector for ZipInspector {
    fn page_count(&self, path: &Path, format: MangaFormat) -> io::Result<u32> {
        match format {
            MangaFormat::Image => Ok(1),
            MangaFormat::Archive if is_zip(path) => {
                let archive = open_zip(path)?;
                Ok(image_entries(&archive).len() as u32)
            }
            _ => Ok(0),
        }
    }

    fn cover_bytes(&self, path: &Path, format: MangaFormat) -> io::Result<Option<Vec<u8>>> {
        match format {
            MangaFormat::Image => std::fs::read(path).map(Some),
            MangaFormat::Archive if is_zip(path) => {
                let mut archive = open_zip(path)?;
                let Some(first) = image_entries(&archive).into_iter().next() else {
                    return Ok(None);
                };
                let mut entry = archive.by_name(&first).map_err(io::Error::other)?;
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            _ => Ok(None),
        }
    }
}

/// Reads `ComicInfo.xml` from zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComicInfoSource;

impl ComicInfoSource {
    fn read(path: &Path) -> io::Result<Option<String>> {
        let mut archive = open_zip(path)?;
        let Some(name) = archive
            .file_names()
            .find(|n| n.eq_ignore_ascii_case("ComicInfo.xml"))
            .map(str::to_string)
        else {
            return Ok(None);
        };
        let mut entry = archive.by_name(&name).map_err(io::Error::other)?;
        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;
        Ok(Some(xml))
    }
}

impl MetadataSource for ComicInfoSource {
    fn hints(&self, path: &Path) -> Option<MetadataHints> {
        if !is_zip(path) {
            return None;
        }
        let xml = match Self::read(path) {
            Ok(xml) => xml?,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no ComicInfo read");
                return None;
            }
        };
        let hints = parse_comic_info(&xml);
        (!hints.is_empty()).then_some(hints)
    }
}

/// Pull series and numbering fields out of a ComicInfo document.
///
/// The first non-empty value of each field wins. A malformed document yields
/// whatever was read before the error.
pub fn parse_comic_info(xml: &str) -> MetadataHints {
    let mut hints = MetadataHints::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut element: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                element = Some(String::from_utf8_lossy(e.name().as_ref()).to_string());
                text.clear();
            }
            Ok(Event::Text(e)) => match e.unescape() {
                Ok(value) => text.push_str(&value),
                Err(err) => debug!(error = %err, "bad entity in ComicInfo text"),
            },
            Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::End(_)) => {
                if let Some(name) = element.take() {
                    let slot = match name.as_str() {
                        "Series" => Some(&mut hints.series),
                        "LocalizedSeries" => Some(&mut hints.localized_series),
                        "Volume" => Some(&mut hints.volume),
                        "Number" => Some(&mut hints.chapter),
                        _ => None,
                    };
                    let value = text.trim();
                    if let Some(slot) = slot.filter(|_| !value.is_empty()) {
                        slot.get_or_insert_with(|| value.to_string());
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                debug!(
                    position = reader.buffer_position(),
                    error = %err,
                    "malformed ComicInfo"
                );
                break;
            }
            _ => {}
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        for (entry, bytes) in entries {
            writer.start_file(*entry, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_pages_and_cover_use_natural_order() {
        let temp = TempDir::new().unwrap();
        let path = archive(
            temp.path(),
            "Beelzebub v01.cbz",
            &[
                ("page10.jpg", b"ten"),
                ("page2.jpg", b"two"),
                ("ComicInfo.xml", b"<ComicInfo/>"),
                ("__MACOSX/._page2.jpg", b"junk"),
            ],
        );
        let inspector = ZipInspector;
        assert_eq!(inspector.page_count(&path, MangaFormat::Archive).unwrap(), 2);
        assert_eq!(
            inspector.cover_bytes(&path, MangaFormat::Archive).unwrap(),
            Some(b"two".to_vec())
        );
    }

    #[test]
    fn test_unsupported_archive_reports_nothing() {
        let inspector = ZipInspector;
        let path = Path::new("/m/Series v01.cbr");
        assert_eq!(inspector.page_count(path, MangaFormat::Archive).unwrap(), 0);
        assert!(inspector.cover_bytes(path, MangaFormat::Archive).unwrap().is_none());
    }

    #[test]
    fn test_broken_zip_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.cbz");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(ZipInspector.page_count(&path, MangaFormat::Archive).is_err());
    }

    #[test]
    fn test_comic_info_hints() {
        let temp = TempDir::new().unwrap();
        let xml = b"<?xml version=\"1.0\"?>\n<ComicInfo>\n  <Series>Attack on Titan</Series>\n  \
                    <LocalizedSeries>Shingeki no Kyojin</LocalizedSeries>\n  <Number>12</Number>\n  \
                    <Volume>3</Volume>\n  <Writer>Isayama &amp; co</Writer>\n</ComicInfo>";
        let path = archive(temp.path(), "aot.cbz", &[("ComicInfo.xml", xml), ("001.jpg", b"x")]);

        let hints = ComicInfoSource.hints(&path).unwrap();
        assert_eq!(hints.series.as_deref(), Some("Attack on Titan"));
        assert_eq!(hints.localized_series.as_deref(), Some("Shingeki no Kyojin"));
        assert_eq!(hints.volume.as_deref(), Some("3"));
        assert_eq!(hints.chapter.as_deref(), Some("12"));
    }

    #[test]
    fn test_comic_info_missing() {
        let temp = TempDir::new().unwrap();
        let path = archive(temp.path(), "plain.cbz", &[("001.jpg", b"x")]);
        assert!(ComicInfoSource.hints(&path).is_none());
        assert!(ComicInfoSource.hints(Path::new("/m/a.pdf")).is_none());
    }

    #[test]
    fn test_parse_comic_info_unescapes() {
        let hints = parse_comic_info("<Series>Tom &amp; Jerry</Series><Number></Number>");
        assert_eq!(hints.series.as_deref(), Some("Tom & Jerry"));
        assert!(hints.chapter.is_none());
    }

    #[test]
    fn test_parse_comic_info_skips_comments_and_reads_cdata() {
        let xml = "<ComicInfo><!-- <Series>Old Name</Series> -->\
                   <Series>Kaguya&#45;sama</Series>\
                   <Volume><![CDATA[3]]></Volume></ComicInfo>";
        let hints = parse_comic_info(xml);
        assert_eq!(hints.series.as_deref(), Some("Kaguya-sama"));
        assert_eq!(hints.volume.as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_comic_info_keeps_fields_before_an_error() {
        let hints = parse_comic_info("<ComicInfo><Series>Vagabond</Series><Volume>2</Nope>");
        assert_eq!(hints.series.as_deref(), Some("Vagabond"));
        assert!(hints.volume.is_none());
    }
}
