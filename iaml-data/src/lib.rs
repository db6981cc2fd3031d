//! CSV loading for program catalogs and session fixtures.

mod loader;

pub use loader::{CatalogLoader, CatalogLoaderError, CatalogRecord, SessionLoader, SessionRow};
