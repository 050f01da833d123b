//! Crate-level error type for configuration, loading, and export failures.
//!
//! SOC band violations are not represented here: they are handled inside the
//! allocator and route handler and never reach the simulation driver.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, SimError>;

/// Kind of entity a schedule record can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Bus,
    Charger,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => f.write_str("bus"),
            Self::Charger => f.write_str("charger"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("schedule record for route {route} references unknown {kind} {id}")]
    EntityNotFound {
        kind: EntityKind,
        id: u32,
        route: u32,
    },
    #[error("invalid {kind} record {id}: {message}")]
    InvalidRecord {
        kind: EntityKind,
        id: u32,
        message: String,
    },
    #[error(
        "charge window [{start}, {end}) of bus {bus} on route {route} is not aligned to the {tick_secs}s tick grid"
    )]
    MisalignedWindow {
        route: u32,
        bus: u32,
        start: i64,
        end: i64,
        tick_secs: i64,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
