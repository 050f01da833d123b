//! Fleet entities: buses, chargers, and the registry that owns them.

/// Bus SOC state machine and power commands.
pub mod bus;
/// Charger plug inventory.
pub mod charger;

use std::collections::BTreeMap;

use tracing::{info, warn};

pub use bus::{Bus, BusId, PowerCommand, PowerType, SocError};
pub use charger::{Charger, ChargerId, PlugType};

use crate::error::{EntityKind, Result, SimError};
use crate::io::records::{BusRecord, ChargerRecord};
use crate::sim::types::SimConfig;

/// Registry of every bus and charger, keyed by stable identifier.
///
/// Iteration is always in identifier order so every table and every
/// allocation pass visits entities the same way on every run.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    buses: BTreeMap<BusId, Bus>,
    chargers: BTreeMap<ChargerId, Charger>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from loader records.
    ///
    /// Charger rows with an existing id add plugs to that charger. A repeated
    /// bus id keeps the first row.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidRecord`] for buses with non-positive
    /// capacity or charge rate, or negative consumption.
    pub fn from_records(
        chargers: &[ChargerRecord],
        buses: &[BusRecord],
        config: &SimConfig,
    ) -> Result<Self> {
        let mut fleet = Self::new();

        for rec in chargers {
            fleet
                .chargers
                .entry(ChargerId(rec.charger_id))
                .or_insert_with(|| Charger::new(ChargerId(rec.charger_id), rec.name.clone()))
                .add_plugs(rec.plug_count, rec.plug_type.clone());
        }

        for rec in buses {
            let id = BusId(rec.bus_id);
            if fleet.buses.contains_key(&id) {
                warn!(bus = rec.bus_id, "Duplicate bus record ignored");
                continue;
            }
            validate_bus(rec)?;
            fleet.add_bus(Bus::new(
                id,
                rec.capacity_kwh,
                rec.consumption_kwh_per_mile,
                rec.charge_rate_kw,
                rec.dist_first_charge_mi,
                rec.plug_type.clone(),
                config,
            ));
        }

        info!(
            buses = fleet.buses.len(),
            chargers = fleet.chargers.len(),
            "Fleet initialized"
        );
        Ok(fleet)
    }

    pub fn add_bus(&mut self, bus: Bus) {
        self.buses.insert(bus.id(), bus);
    }

    pub fn add_charger(&mut self, charger: Charger) {
        self.chargers.insert(charger.id(), charger);
    }

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.get(&id)
    }

    pub fn bus_mut(&mut self, id: BusId) -> Option<&mut Bus> {
        self.buses.get_mut(&id)
    }

    pub fn charger(&self, id: ChargerId) -> Option<&Charger> {
        self.chargers.get(&id)
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.values()
    }

    pub fn chargers(&self) -> impl Iterator<Item = &Charger> {
        self.chargers.values()
    }

    pub fn charger_ids(&self) -> impl Iterator<Item = ChargerId> + '_ {
        self.chargers.keys().copied()
    }

    pub fn num_buses(&self) -> usize {
        self.buses.len()
    }

    /// Every `(charger, plug type)` pair, in the column order of the plug usage table.
    pub fn plug_columns(&self) -> Vec<(ChargerId, PlugType)> {
        self.chargers
            .values()
            .flat_map(|c| c.plug_types().map(|p| (c.id(), p.clone())))
            .collect()
    }
}

fn validate_bus(rec: &BusRecord) -> Result<()> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    let message = if !positive(rec.capacity_kwh) {
        "capacity_kwh must be > 0"
    } else if !positive(rec.charge_rate_kw) {
        "charge_rate_kw must be > 0"
    } else if !rec.consumption_kwh_per_mile.is_finite() || rec.consumption_kwh_per_mile < 0.0 {
        "consumption_kwh_per_mile must be >= 0"
    } else {
        return Ok(());
    };
    Err(SimError::InvalidRecord {
        kind: EntityKind::Bus,
        id: rec.bus_id,
        message: message.to_string(),
    })
}
