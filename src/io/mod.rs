/// CSV export of per-tick tables.
pub mod export;
/// CSV input records and loaders.
pub mod records;
