use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Stable charger identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChargerId(pub u32);

impl fmt::Display for ChargerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Charging connector standard. Buses only charge from plugs of their own type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct PlugType(String);

impl PlugType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlugType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlugType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlugType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A charging station and its plug inventory.
///
/// The charger is a capacity fact: it knows how many plugs of each type it
/// has, while per-tick occupancy lives in the engine's tick context.
#[derive(Debug, Clone)]
pub struct Charger {
    id: ChargerId,
    name: String,
    plugs: BTreeMap<PlugType, u32>,
}

impl Charger {
    /// Creates a charger with no plugs.
    pub fn new(id: ChargerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            plugs: BTreeMap::new(),
        }
    }

    /// Adds `count` plugs of `plug_type`; repeated calls accumulate.
    pub fn add_plugs(&mut self, count: u32, plug_type: PlugType) {
        *self.plugs.entry(plug_type).or_insert(0) += count;
    }

    pub fn id(&self) -> ChargerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total plugs of `plug_type`, or `None` if this charger has none of that type.
    pub fn num_plugs(&self, plug_type: &PlugType) -> Option<u32> {
        self.plugs.get(plug_type).copied()
    }

    /// Plugs of `plug_type` still free given `in_use` already placed this tick.
    ///
    /// Returns `None` for plug types this charger does not carry.
    pub fn num_plugs_avail(&self, plug_type: &PlugType, in_use: u32) -> Option<u32> {
        self.num_plugs(plug_type)
            .map(|total| total.saturating_sub(in_use))
    }

    /// Plug types carried by this charger, in stable order.
    pub fn plug_types(&self) -> impl Iterator<Item = &PlugType> {
        self.plugs.keys()
    }

    /// Plug count across all types.
    pub fn total_plugs(&self) -> u32 {
        self.plugs.values().sum()
    }
}
