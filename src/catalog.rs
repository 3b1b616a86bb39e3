use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::{info, warn};

use crate::decoder::{self, hex_preview};
use crate::error::{DecodeError, RecordError, StoreError};
use crate::importer::{RawRecord, RecordSource};
use crate::metadata::{UNKNOWN_DATE, extract_date_from, extract_title_from, parse_structured};

/// Group label for keys without a `:` separator.
pub const NO_PREFIX: &str = "(no prefix)";

/// A stored record after decompression and decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// `raw_key` with the configured key prefix removed.
    pub id: String,
    pub raw_key: String,
    /// Decoded text, or a hex preview when the payload is not UTF-8.
    pub decoded_text: String,
    pub structured: Option<Value>,
    pub was_compressed: bool,
    /// The undecodable bytes, for records whose payload is not text.
    pub binary: Option<Vec<u8>>,
}

impl DecodedRecord {
    pub fn is_binary(&self) -> bool {
        self.binary.is_some()
    }

    /// Text used for search. Binary payloads are searched through a lossy decode so
    /// readable fragments inside them still match.
    fn searchable_text(&self) -> Cow<'_, str> {
        match &self.binary {
            Some(bytes) => String::from_utf8_lossy(bytes),
            None => Cow::Borrowed(&self.decoded_text),
        }
    }
}

/// Display metadata derived from a record. Used only for listing and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub id: String,
    pub display_date: String,
    pub display_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub record: DecodedRecord,
    pub summary: RecordSummary,
}

/// Every decoded record of one load, newest first.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    skipped: usize,
}

impl Catalog {
    /// Filter, decode and sort `records`.
    ///
    /// Only keys starting with `key_prefix` are kept (all keys when it is empty). Rows that
    /// cannot be processed at all are dropped and counted in [`Catalog::skipped`].
    pub fn build(records: Vec<RawRecord>, key_prefix: &str) -> Self {
        let mut entries = Vec::new();
        let mut skipped = 0;

        for raw in records {
            if !key_prefix.is_empty() && !raw.key.starts_with(key_prefix) {
                continue;
            }
            match process_record(raw, key_prefix) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    warn!("Dropping record: {e}");
                }
            }
        }

        // `sort_by` is stable, so records with equal dates keep their load order.
        entries.sort_by(|a, b| sort_key(&b.summary).cmp(sort_key(&a.summary)));

        Self { entries, skipped }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows dropped during [`Catalog::build`].
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Index of the first entry matching `predicate`, in catalog order.
    pub fn position(&self, predicate: impl Fn(&CatalogEntry) -> bool) -> Option<usize> {
        self.entries.iter().position(predicate)
    }

    /// Jump-to-first-match search: case-insensitive substring over id, title and
    /// decoded text. An empty term matches nothing.
    pub fn find(&self, term: &str) -> Option<usize> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.position(|entry| {
            entry.record.id.to_lowercase().contains(&needle)
                || entry.summary.display_title.to_lowercase().contains(&needle)
                || entry
                    .record
                    .searchable_text()
                    .to_lowercase()
                    .contains(&needle)
        })
    }

    /// Look an entry up by its id or by its full store key.
    pub fn lookup(&self, id_or_key: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.record.id == id_or_key)
            .or_else(|| self.entries.iter().find(|e| e.record.raw_key == id_or_key))
    }
}

fn sort_key(summary: &RecordSummary) -> &str {
    if summary.display_date == UNKNOWN_DATE {
        ""
    } else {
        &summary.display_date
    }
}

fn process_record(raw: RawRecord, key_prefix: &str) -> Result<CatalogEntry, RecordError> {
    let RawRecord { key, payload } = raw;
    let Some(payload) = payload else {
        return Err(RecordError::MissingPayload { key });
    };

    let id = key.strip_prefix(key_prefix).unwrap_or(&key).to_string();

    let record = match decoder::decode(&payload) {
        Ok(decoded) => DecodedRecord {
            structured: parse_structured(&decoded.text),
            decoded_text: decoded.text,
            was_compressed: decoded.was_compressed,
            binary: None,
            id,
            raw_key: key,
        },
        Err(DecodeError::Binary {
            bytes,
            was_compressed,
        }) => DecodedRecord {
            decoded_text: hex_preview(&bytes),
            structured: None,
            was_compressed,
            binary: Some(bytes),
            id,
            raw_key: key,
        },
    };

    let summary = RecordSummary {
        id: record.id.clone(),
        display_date: extract_date_from(record.structured.as_ref()),
        display_title: extract_title_from(record.structured.as_ref()),
    };

    Ok(CatalogEntry { record, summary })
}

/// Read everything from `source` and build a catalog. A store failure aborts the load.
pub fn load(source: &impl RecordSource, key_prefix: &str) -> Result<Catalog, StoreError> {
    let records = source.read_records()?;
    let total = records.len();
    let catalog = Catalog::build(records, key_prefix);
    info!(
        total,
        loaded = catalog.len(),
        skipped = catalog.skipped(),
        prefix = key_prefix,
        "catalog loaded"
    );
    Ok(catalog)
}

// ---------------------------------------------------------------------------
// Key prefix analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCount {
    pub prefix: String,
    pub count: usize,
}

/// Count keys per prefix (text up to and including the first `:`), most common first.
pub fn analyze_prefixes<I, S>(keys: I) -> Vec<PrefixCount>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts: Vec<PrefixCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for key in keys {
        let key = key.as_ref();
        let prefix = match key.find(':') {
            Some(pos) => &key[..=pos],
            None => NO_PREFIX,
        };
        match index.get(prefix) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(prefix.to_string(), counts.len());
                counts.push(PrefixCount {
                    prefix: prefix.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn prefix_report(total_keys: usize, counts: &[PrefixCount]) -> String {
    let mut report = String::from("Database Key Analysis:\n\n");
    let _ = write!(report, "Total keys: {total_keys}\n\nKey prefixes found:\n");
    for PrefixCount { prefix, count } in counts {
        let _ = writeln!(report, "- {prefix}: {count} keys");
    }
    report
}

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// The caller's view of the data: the current catalog and selection.
#[derive(Debug, Default)]
pub struct ViewerState {
    catalog: Option<Catalog>,
    selected: Option<usize>,
}

impl ViewerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Replace the catalog with a fresh load. On failure the previous catalog and
    /// selection are kept.
    pub fn reload(
        &mut self,
        source: &impl RecordSource,
        key_prefix: &str,
    ) -> Result<&Catalog, StoreError> {
        let catalog = load(source, key_prefix)?;
        self.selected = None;
        Ok(self.catalog.insert(catalog))
    }

    pub fn select(&mut self, index: usize) -> Option<&CatalogEntry> {
        let entry = self.catalog.as_ref()?.get(index)?;
        self.selected = Some(index);
        Some(entry)
    }

    pub fn selected(&self) -> Option<&CatalogEntry> {
        self.catalog.as_ref()?.get(self.selected?)
    }

    /// Move the selection to the first entry matching `term`.
    pub fn search(&mut self, term: &str) -> Option<usize> {
        if term.trim().is_empty() {
            return None;
        }
        self.selected = None;
        let index = self.catalog.as_ref()?.find(term)?;
        self.selected = Some(index);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dated(key: &str, date: &str) -> RawRecord {
        RawRecord::text(key, format!(r#"{{"date": "{date}", "title": "{key}"}}"#))
    }

    fn ids(catalog: &Catalog) -> Vec<&str> {
        catalog.entries().iter().map(|e| e.record.id.as_str()).collect()
    }

    #[test]
    fn sorts_newest_first_with_unknown_last() {
        let catalog = Catalog::build(
            vec![
                dated("a", "2024-01-02 10:00"),
                RawRecord::text("b", "plain text, no date"),
                dated("c", "2024-03-01 09:00"),
            ],
            "",
        );
        assert_eq!(ids(&catalog), ["c", "a", "b"]);
        assert_eq!(catalog.entries()[2].summary.display_date, UNKNOWN_DATE);
    }

    #[test]
    fn unknown_dates_keep_load_order() {
        let catalog = Catalog::build(
            vec![
                RawRecord::text("u1", "{}"),
                dated("d", "2024-01-01 00:00"),
                RawRecord::text("u2", "x"),
                RawRecord::text("u3", "[]"),
            ],
            "",
        );
        assert_eq!(ids(&catalog), ["d", "u1", "u2", "u3"]);
    }

    #[test]
    fn prefix_filters_and_is_stripped() {
        let catalog = Catalog::build(
            vec![
                RawRecord::text("composerData:abc", "{}"),
                RawRecord::text("bubbleId:xyz", "{}"),
                RawRecord::text("composerData:composerData:def", "{}"),
            ],
            "composerData:",
        );
        assert_eq!(ids(&catalog), ["abc", "composerData:def"]);
        assert_eq!(catalog.entries()[0].record.raw_key, "composerData:abc");
    }

    #[test]
    fn empty_prefix_keeps_full_keys() {
        let catalog = Catalog::build(vec![RawRecord::text("chat:1", "{}")], "");
        assert_eq!(ids(&catalog), ["chat:1"]);
    }

    #[test]
    fn null_payloads_are_skipped_and_counted() {
        let catalog = Catalog::build(
            vec![
                RawRecord {
                    key: "chat:gone".into(),
                    payload: None,
                },
                RawRecord::text("chat:ok", "{}"),
            ],
            "chat:",
        );
        assert_eq!(ids(&catalog), ["ok"]);
        assert_eq!(catalog.skipped(), 1);
    }

    #[test]
    fn binary_records_are_kept_with_hex_preview() {
        let catalog = Catalog::build(vec![RawRecord::bytes("bin", vec![0xff, 0x00])], "");
        let entry = &catalog.entries()[0];
        assert!(entry.record.is_binary());
        assert_eq!(entry.record.structured, None);
        assert!(entry.record.decoded_text.ends_with("ff 00"));
        assert_eq!(entry.summary.display_date, UNKNOWN_DATE);
        assert_eq!(entry.summary.display_title, "");
    }

    #[test]
    fn find_is_case_insensitive_and_returns_first_match() {
        let catalog = Catalog::build(
            vec![
                dated("older", "2023-01-01 00:00"),
                RawRecord::text("needle-id", r#"{"date": "2024-06-01 00:00"}"#),
                RawRecord::text(
                    "body",
                    r#"{"date": "2022-01-01 00:00", "x": "Has NEEDLE inside"}"#,
                ),
            ],
            "",
        );
        assert_eq!(ids(&catalog), ["needle-id", "older", "body"]);
        assert_eq!(catalog.find("NeEdLe"), Some(0));
        assert_eq!(catalog.find("has needle"), Some(2));
        assert_eq!(catalog.find("older"), Some(1));
        assert_eq!(catalog.find("absent"), None);
        assert_eq!(catalog.find(""), None);
    }

    #[test]
    fn find_looks_inside_binary_payloads() {
        let mut bytes = b"prefix secret-word ".to_vec();
        bytes.push(0xff);
        let catalog = Catalog::build(vec![RawRecord::bytes("bin", bytes)], "");
        assert_eq!(catalog.find("SECRET-word"), Some(0));
    }

    #[test]
    fn lookup_accepts_id_or_raw_key() {
        let catalog = Catalog::build(vec![RawRecord::text("chat:42", "{}")], "chat:");
        assert!(catalog.lookup("42").is_some());
        assert!(catalog.lookup("chat:42").is_some());
        assert!(catalog.lookup("43").is_none());
    }

    #[test]
    fn analyzes_prefixes_by_count() {
        let keys = [
            "bubbleId:1",
            "composerData:1",
            "bubbleId:2",
            "plain",
            "composerData:2",
            "bubbleId:3:4",
        ];
        let counts = analyze_prefixes(keys);
        assert_eq!(
            counts,
            vec![
                PrefixCount {
                    prefix: "bubbleId:".into(),
                    count: 3,
                },
                PrefixCount {
                    prefix: "composerData:".into(),
                    count: 2,
                },
                PrefixCount {
                    prefix: NO_PREFIX.into(),
                    count: 1,
                },
            ]
        );
        let report = prefix_report(keys.len(), &counts);
        assert!(report.starts_with("Database Key Analysis:\n\nTotal keys: 6\n"));
        assert!(report.contains("- bubbleId:: 3 keys\n"));
        assert!(report.contains("- (no prefix): 1 keys\n"));
    }

    struct Unreachable;

    impl RecordSource for Unreachable {
        fn read_records(&self) -> Result<Vec<RawRecord>, StoreError> {
            Err(StoreError::NotFound(PathBuf::from("/nowhere/state.vscdb")))
        }
    }

    #[test]
    fn failed_reload_keeps_previous_catalog() {
        let mut state = ViewerState::new();
        let source = vec![
            dated("chat:a", "2024-01-01 00:00"),
            dated("chat:b", "2024-02-01 00:00"),
        ];
        state.reload(&source, "chat:").unwrap();
        assert_eq!(state.search("2024-01"), Some(1));
        assert_eq!(state.selected().unwrap().record.id, "a");

        assert!(state.reload(&Unreachable, "chat:").is_err());
        assert_eq!(state.catalog().unwrap().len(), 2);
        assert_eq!(state.selected().unwrap().record.id, "a");
    }

    #[test]
    fn reload_clears_selection_and_search_moves_it() {
        let mut state = ViewerState::new();
        let source = vec![dated("x", "2024-01-01 00:00"), dated("y", "2023-01-01 00:00")];
        state.reload(&source, "").unwrap();
        assert!(state.select(1).is_some());
        state.reload(&source, "").unwrap();
        assert!(state.selected().is_none());

        assert_eq!(state.search("   "), None);
        assert_eq!(state.search("nothing like this"), None);
        assert!(state.selected().is_none());
        assert!(state.select(9).is_none());
    }
}
