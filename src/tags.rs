use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::domain::TagRecord;
use crate::error::ExifError;
use crate::fs_util;
use crate::hooks::Hooks;

pub trait TagDirectory: Send + Sync {
    fn is_cached(&self) -> bool;
    fn load(&self) -> Result<Vec<TagRecord>, ExifError>;
    fn build(&self) -> Result<Vec<TagRecord>, ExifError>;
    fn save(&self, records: &[TagRecord]) -> Result<bool, ExifError>;
}

/// Tag groups exiftool documents per page, and the file types that carry them.
const FILE_TYPE_GROUPS: &[(&str, &[&str])] = &[
    ("JPEG", &["EXIF", "IPTC", "XMP", "JFIF"]),
    ("TIFF", &["EXIF", "IPTC", "XMP"]),
    ("TIF", &["EXIF", "IPTC", "XMP"]),
    ("PNG", &["PNG", "EXIF", "XMP"]),
    ("GIF", &["GIF", "XMP"]),
    ("HEIC", &["EXIF", "XMP", "QuickTime"]),
    ("MOV", &["QuickTime", "XMP"]),
    ("MP4", &["QuickTime", "XMP"]),
    ("PDF", &["PDF", "XMP"]),
];

#[derive(Debug, Serialize, Deserialize)]
struct TagCache {
    generated_at: DateTime<Utc>,
    records: Vec<TagRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedTag {
    pub name: String,
    pub writable: bool,
    pub notes: Option<String>,
}

pub struct HttpTagDirectory {
    client: Client,
    base_url: String,
    cache_path: PathBuf,
    hooks: Hooks,
}

impl HttpTagDirectory {
    pub fn new(cache_path: impl Into<PathBuf>, hooks: Hooks) -> Result<Self, ExifError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("exiftool-runner/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ExifError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ExifError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: "https://exiftool.org/TagNames".to_string(),
            cache_path: cache_path.into(),
            hooks,
        })
    }

    fn fetch_group(&self, group: &str) -> Result<String, ExifError> {
        let url = format!("{}/{group}.html", self.base_url);
        self.hooks.log(format!("fetching tag table {url}"));
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| ExifError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "tag table request failed".to_string());
            return Err(ExifError::HttpStatus { status, message });
        }
        response.text().map_err(|err| ExifError::Http(err.to_string()))
    }
}

impl TagDirectory for HttpTagDirectory {
    fn is_cached(&self) -> bool {
        self.cache_path.is_file()
    }

    fn load(&self) -> Result<Vec<TagRecord>, ExifError> {
        let content = fs::read_to_string(&self.cache_path).map_err(|err| {
            ExifError::Filesystem(format!("read {}: {err}", self.cache_path.display()))
        })?;
        let cache: TagCache = serde_json::from_str(&content)
            .map_err(|err| ExifError::Filesystem(format!("parse tag cache: {err}")))?;
        tracing::debug!(generated_at = %cache.generated_at, "loaded tag cache");
        Ok(cache.records)
    }

    fn build(&self) -> Result<Vec<TagRecord>, ExifError> {
        let mut groups: HashMap<&str, Vec<ScrapedTag>> = HashMap::new();
        let mut records = Vec::new();
        for (file_type, wanted) in FILE_TYPE_GROUPS {
            for group in wanted.iter() {
                if !groups.contains_key(group) {
                    let html = self.fetch_group(group)?;
                    groups.insert(group, parse_tag_table(&html)?);
                }
                for tag in groups.get(group).into_iter().flatten() {
                    records.push(TagRecord {
                        file_type: file_type.to_string(),
                        field_name: tag.name.clone(),
                        writable: tag.writable,
                        allowed_values: tag.notes.clone(),
                    });
                }
            }
        }
        self.hooks
            .log(format!("built tag directory with {} records", records.len()));
        Ok(records)
    }

    fn save(&self, records: &[TagRecord]) -> Result<bool, ExifError> {
        let cache = TagCache {
            generated_at: Utc::now(),
            records: records.to_vec(),
        };
        fs_util::write_json_tabbed(&cache, &self.cache_path)?;
        Ok(true)
    }
}

/// Extracts rows from one exiftool TagNames HTML table.
///
/// Pages with a leading "Tag ID" column have four cells per row, the XMP-style
/// pages three; header rows use `<th>` and are skipped. Only direct rows and
/// cells of `table.inner` are read, so value tables nested in the notes column
/// do not produce tags.
pub fn parse_tag_table(html: &str) -> Result<Vec<ScrapedTag>, ExifError> {
    let document = Html::parse_document(html);
    let rows = Selector::parse("table.inner > tbody > tr, table.inner > tr")
        .map_err(|err| ExifError::TagTable(format!("row selector: {err}")))?;

    let mut tags = Vec::new();
    for row in document.select(&rows) {
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| cell.value().name() == "td")
            .map(cell_text)
            .collect();
        let (names, writable, notes) = match cells.len() {
            0..=2 => continue,
            3 => (&cells[0], &cells[1], &cells[2]),
            _ => (&cells[1], &cells[2], &cells[3]),
        };
        let notes = Some(notes).filter(|text| !text.is_empty());
        for name in names.split_whitespace() {
            let name = name.trim_end_matches(|ch: char| !ch.is_ascii_alphanumeric());
            if name.is_empty() || !name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
                continue;
            }
            tags.push(ScrapedTag {
                name: name.to_string(),
                writable: is_writable(writable),
                notes: notes.cloned(),
            });
        }
    }
    Ok(tags)
}

fn is_writable(column: &str) -> bool {
    let column = column.trim();
    !(column.is_empty() || column == "-" || column.eq_ignore_ascii_case("no"))
}

/// Decoded text of a cell; text nodes split by `<br>` or inline tags are
/// joined with single spaces.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// File type -> field name -> record.
#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    by_type: HashMap<String, HashMap<String, TagRecord>>,
}

impl TagCatalog {
    pub fn from_records(records: Vec<TagRecord>) -> Self {
        let mut by_type: HashMap<String, HashMap<String, TagRecord>> = HashMap::new();
        for record in records {
            let fields = by_type.entry(record.file_type.clone()).or_default();
            let key = record.field_name.to_ascii_lowercase();
            // The first group listing a tag wins, unless a later one can write it.
            match fields.get(&key) {
                Some(existing) if existing.writable || !record.writable => {}
                _ => {
                    fields.insert(key, record);
                }
            }
        }
        Self { by_type }
    }

    pub fn has_file_type(&self, file_type: &str) -> bool {
        self.by_type.contains_key(file_type)
    }

    /// Looks up a field, ignoring a `Group:` prefix and letter case the same way
    /// exiftool does.
    pub fn lookup(&self, file_type: &str, field: &str) -> Option<&TagRecord> {
        let name = field.rsplit(':').next().unwrap_or(field);
        self.by_type
            .get(file_type)?
            .get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_type.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait TagLookup: Send + Sync {
    fn catalog(&self) -> Result<Arc<TagCatalog>, ExifError>;
}

/// Loads the cached directory, or builds and caches it, on first use.
pub struct LazyTagCatalog<D: TagDirectory> {
    directory: D,
    loaded: Mutex<Option<Arc<TagCatalog>>>,
}

impl<D: TagDirectory> LazyTagCatalog<D> {
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            loaded: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Rebuilds from the remote source and overwrites the cache.
    pub fn refresh(&self) -> Result<Arc<TagCatalog>, ExifError> {
        let records = self.directory.build()?;
        self.directory.save(&records)?;
        let catalog = Arc::new(TagCatalog::from_records(records));
        if let Ok(mut guard) = self.loaded.lock() {
            *guard = Some(catalog.clone());
        }
        Ok(catalog)
    }
}

impl<D: TagDirectory> TagLookup for LazyTagCatalog<D> {
    fn catalog(&self) -> Result<Arc<TagCatalog>, ExifError> {
        let mut guard = self
            .loaded
            .lock()
            .map_err(|_| ExifError::Filesystem("tag catalog lock poisoned".to_string()))?;
        if let Some(catalog) = guard.as_ref() {
            return Ok(catalog.clone());
        }
        let records = if self.directory.is_cached() {
            self.directory.load()?
        } else {
            let records = self.directory.build()?;
            if let Err(err) = self.directory.save(&records) {
                tracing::warn!(error = %err, "could not cache tag directory");
            }
            records
        };
        let catalog = Arc::new(TagCatalog::from_records(records));
        *guard = Some(catalog.clone());
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXIF_FIXTURE: &str = r#"
<table class=inner cellspacing=1>
<tr class=h><th>Tag ID</th><th>Tag Name</th><th>Writable</th><th>Group</th></tr>
<tr><td>0x000b</td>
<td>ProcessingSoftware</td>
<td class=c>string</td>
<td><span class=s>IFD0</span></td></tr>
<tr class=b><td>0x013b</td>
<td>Artist</td>
<td class=c>string</td>
<td><span class=s>IFD0<br>(becomes a list-type tag)</span></td></tr>
<tr><td>0x8769</td>
<td>ExifOffset</td>
<td class=c>-</td>
<td>&nbsp;</td></tr>
</table>"#;

    const XMP_FIXTURE: &str = r#"
<table class=inner>
<tr class=h><th>Tag Name</th><th>Writable</th><th>Values / Notes</th></tr>
<tr><td>Rating</td>
<td class=c>real</td>
<td>&nbsp;</td></tr>
<tr><td>CreatorTool<br>Creator</td>
<td class=c>no</td>
<td>Values: A &amp; B</td></tr>
</table>"#;

    const NESTED_FIXTURE: &str = r#"
<table class=inner>
<tr><td>0x0112</td>
<td>Orientation</td>
<td class=c>int16u</td>
<td><span class=s>IFD0</span><table class=cols><tr>
<td>1 = Horizontal (normal)<br>2 = Mirror horizontal</td>
<td>3 = Rotate 180<br>4 = Mirror vertical</td>
</tr></table></td></tr>
<tr><td>0xa420</td>
<td>ImageUniqueID</td>
<td class=c>string</td>
<td>Literal &amp;lt;tag&amp;gt; and &#39;q&#39; &#x2014; done</td></tr>
</table>"#;

    #[test]
    fn parses_four_column_tables() {
        let tags = parse_tag_table(EXIF_FIXTURE).unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[1].name, "Artist");
        assert!(tags[1].writable);
        assert_eq!(tags[1].notes.as_deref(), Some("IFD0 (becomes a list-type tag)"));
        assert!(!tags[2].writable);
    }

    #[test]
    fn parses_three_column_tables() {
        let tags = parse_tag_table(XMP_FIXTURE).unwrap();
        let names: Vec<_> = tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, vec!["Rating", "CreatorTool", "Creator"]);
        assert!(tags[0].writable);
        assert!(tags[0].notes.is_none());
        assert!(!tags[1].writable);
        assert_eq!(tags[2].notes.as_deref(), Some("Values: A & B"));
    }

    #[test]
    fn nested_value_tables_stay_in_notes() {
        let tags = parse_tag_table(NESTED_FIXTURE).unwrap();
        let names: Vec<_> = tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, vec!["Orientation", "ImageUniqueID"]);
        assert_eq!(
            tags[0].notes.as_deref(),
            Some("IFD0 1 = Horizontal (normal) 2 = Mirror horizontal 3 = Rotate 180 4 = Mirror vertical")
        );
    }

    #[test]
    fn entities_are_decoded_once() {
        let tags = parse_tag_table(NESTED_FIXTURE).unwrap();
        assert_eq!(
            tags[1].notes.as_deref(),
            Some("Literal &lt;tag&gt; and 'q' \u{2014} done")
        );
    }

    #[test]
    fn rows_outside_tag_tables_are_ignored() {
        let html = "<table class=frame><tr><td>a</td><td>b</td><td>c</td></tr></table>";
        assert!(parse_tag_table(html).unwrap().is_empty());
    }

    #[test]
    fn catalog_lookup_ignores_group_and_case() {
        let catalog = TagCatalog::from_records(vec![TagRecord {
            file_type: "JPEG".to_string(),
            field_name: "Artist".to_string(),
            writable: true,
            allowed_values: None,
        }]);
        assert!(catalog.lookup("JPEG", "EXIF:artist").is_some());
        assert!(catalog.lookup("PNG", "Artist").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
