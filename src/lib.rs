//! Minute-resolution electric bus fleet charging simulator.
//!
//! Buses follow a fixed schedule of charge windows at depot chargers. Each
//! tick the engine ranks the buses present at every charger, charges the
//! ones that cannot make their next trip otherwise, spends the external
//! power request on the rest, and draws trip energy from departing buses.

pub mod cli;
pub mod config;
pub mod error;
/// Buses, chargers, and the fleet registry.
pub mod fleet;
pub mod io;
pub mod request;
pub mod runner;
pub mod scenario;
/// Simulation engine, allocation phases, scheduling, and telemetry.
pub mod sim;
