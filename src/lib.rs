//! Declarative field extraction for XML and HTML documents
//!
//! Turns a parsed document plus a declarative field map into a record with
//! the map's exact shape:
//! - Document trees from XML (quick-xml, namespace aware) or HTML (scraper)
//! - Field paths with child/descendant steps, namespaces, positions,
//!   attributes and alternatives
//! - Missing fields reported as explicit absent markers
//! - Flat tables and CSV export
//! - Built-in maps for CT-e transport documents and fixed HTML tables
//! - FFI interface for C/C++ hosts

pub mod error;
pub mod extractor;
pub mod ffi;
pub mod field_map;
pub mod path;
pub mod schemas;
pub mod table;
pub mod tree;

pub use error::*;
pub use extractor::{extract, AmbiguityPolicy, ExtractorConfig, FieldExtractor, FieldValue, Record};
pub use field_map::{FieldMap, FieldSpec, Transform};
pub use path::FieldPath;
pub use table::{flatten, CsvOptions, Table};
pub use tree::{Document, DocumentKind, NodeId};
