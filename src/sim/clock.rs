use crate::sim::types::SimConfig;

/// A simulation clock that walks the tick grid of one horizon.
///
/// Each tick yields its epoch timestamp; the clock ends after
/// [`SimConfig::total_ticks`] ticks.
///
/// # Examples
///
/// ```
/// use bus_charge_sim::sim::clock::Clock;
/// use bus_charge_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(1, 0).with_tick_secs(28_800);
/// let mut clock = Clock::new(&cfg);
/// let mut times = Vec::new();
///
/// clock.run(|_, t| times.push(t));
/// assert_eq!(times, vec![16_200, 45_000, 73_800]);
/// ```
pub struct Clock {
    /// Index of the next tick
    current: usize,
    total: usize,
    start_time: i64,
    tick_secs: i64,
}

impl Clock {
    /// Creates a clock positioned at the first tick of the horizon.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            current: 0,
            total: config.total_ticks(),
            start_time: config.start_time,
            tick_secs: config.tick_secs,
        }
    }

    /// Advances the clock by one tick.
    ///
    /// # Returns
    ///
    /// * `Some((index, time))` - The tick index and its epoch timestamp
    /// * `None` - If the horizon is exhausted
    pub fn tick(&mut self) -> Option<(usize, i64)> {
        if self.current < self.total {
            let index = self.current;
            self.current += 1;
            Some((index, self.start_time + index as i64 * self.tick_secs))
        } else {
            None
        }
    }

    /// Ticks not yet yielded.
    pub fn remaining(&self) -> usize {
        self.total - self.current
    }

    /// Runs a function for each remaining tick.
    pub fn run(&mut self, mut f: impl FnMut(usize, i64)) {
        while let Some((index, time)) = self.tick() {
            f(index, time);
        }
    }
}
