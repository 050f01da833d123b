/// Plug and power assignment phases.
pub mod allocator;
/// Simulation clock for tick management.
pub mod clock;
pub mod engine;
pub mod kpi;
pub mod priority;
/// Departure detection and trip energy draw.
pub mod routes;
/// Charge window presence index and trip table.
pub mod schedule;
pub mod telemetry;
pub mod tick;
pub mod types;
