//! # cursor-chat-export
//!
//! Browse, search and export the AI chat history that [Cursor](https://cursor.com) keeps in
//! its global state database.
//!
//! ## What it does
//!
//! Cursor stores editor state in a SQLite file (`state.vscdb`) with a single key-value table.
//! Chat sessions are JSON documents under keys like `composerData:<uuid>`, sometimes
//! zlib-compressed. This crate reads every row, decodes the payloads, pulls a display date and
//! title out of whatever JSON shape each record has, and renders a record as pretty JSON, a
//! readable transcript, or the raw text.
//!
//! The database is opened **read-only**. By default reads go through a temporary snapshot
//! taken with SQLite's backup API, so a running Cursor instance is not disturbed.
//!
//! ## Pipeline
//!
//! ```text
//! store rows ─▶ decoder ─▶ metadata ─▶ catalog ─▶ exporter
//! ```
//!
//! - [`decoder`] turns a stored value into text, inflating zlib payloads.
//! - [`metadata`] extracts the display date and title. It never fails.
//! - [`catalog`] filters by key prefix, sorts newest first and searches.
//! - [`exporter`] renders a record and writes export files.
//!
//! ```no_run
//! use cursor_chat_export::{ExportFormat, RenderMode, SqliteStore, catalog, exporter};
//!
//! let store = SqliteStore::new("state.vscdb");
//! let catalog = catalog::load(&store, "composerData:")?;
//! if let Some(index) = catalog.find("refactor") {
//!     let record = &catalog.entries()[index].record;
//!     println!("{}", exporter::render(record, RenderMode::Transcript));
//!     let payload = exporter::export(record, ExportFormat::Json)?;
//!     exporter::write_export("chat.json".as_ref(), &payload)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Compatibility
//!
//! Cursor's record schemas are undocumented and change between versions. Extraction is
//! best-effort: a record with an unfamiliar shape still loads, just with an `Unknown` date
//! or an empty title.
pub mod catalog;
pub mod decoder;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod metadata;
pub mod utils;

pub use catalog::{Catalog, CatalogEntry, DecodedRecord, RecordSummary, ViewerState};
pub use error::{DecodeError, ExportError, RecordError, StoreError};
pub use exporter::{ExportFormat, ExportPayload, RenderMode};
pub use importer::{Payload, RawRecord, RecordSource, SqliteStore};
pub use utils::LoadConfig;
