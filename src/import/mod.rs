//! Bulk import of assembled graphs into a graph store

mod cancel;
mod importer;
mod verify;


pub use cancel::CancellationToken;
pub use importer::{BulkImporter, ImportError, ImportMode, ImportReport, StoreWriteError};
pub use verify::{verify_book, HierarchyDefect};
