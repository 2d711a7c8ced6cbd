//! Record/edge/cluster/golden-record store backends for the entitylink
//! entity resolution engine.
//!
//! `entitylink` defines the store traits (`RecordStore`, `EdgeStore`,
//! `ClusterStore`, `GoldenRecordStore`); this crate supplies the one
//! backend shipped by default — [`embedded::EmbeddedStore`], an
//! in-process store with a tantivy-backed `text_search` — plus the CSV
//! bulk-loader decorator used above the edge-count threshold configured
//! in `edges.bulk_path_threshold`.

mod error;

pub mod csv_bulk;
pub mod embedded;

pub use csv_bulk::CsvBulkEdgeStore;
pub use embedded::{EmbeddedStore, ViewSpec};
