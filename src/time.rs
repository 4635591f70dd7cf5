//! Fixed-timestep engine clock using an accumulator pattern.
//!
//! The host calls `advance()` with whatever wall-clock delta it observed.
//! `GameTime` turns that into whole ticks on a fixed grid, so every timed
//! effect is evaluated at a deterministic timestamp and fully testable.

pub struct GameTime {
    /// Milliseconds per tick (1000 = 1 Hz).
    ms_per_tick: u64,
    /// Longest delta a single `advance` will honour.
    max_catch_up_ms: u64,
    /// Clock value at creation.
    origin_ms: u64,
    /// Milliseconds elapsed since `origin_ms`, after clamping.
    elapsed_ms: u64,
    /// Total elapsed ticks since creation.
    pub total_ticks: u64,
}

impl GameTime {
    /// `origin_ms` is the clock reading at tick 0 (usually wall-clock ms).
    pub fn new(ms_per_tick: u64, max_catch_up_ms: u64, origin_ms: u64) -> Self {
        Self {
            ms_per_tick: ms_per_tick.max(1),
            max_catch_up_ms,
            origin_ms,
            elapsed_ms: 0,
            total_ticks: 0,
        }
    }

    /// Current engine time. Moves with every `advance`, not only on ticks.
    pub fn now_ms(&self) -> u64 {
        self.origin_ms + self.elapsed_ms
    }

    /// Feed an elapsed wall-clock delta. Returns the timestamps of every tick
    /// that became due, oldest first.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<u64> {
        // Clamp so a backgrounded tab doesn't replay hours of ticks.
        let delta = delta_ms.min(self.max_catch_up_ms);
        self.elapsed_ms += delta;

        let mut due = Vec::new();
        while (self.total_ticks + 1) * self.ms_per_tick <= self.elapsed_ms {
            self.total_ticks += 1;
            due.push(self.origin_ms + self.total_ticks * self.ms_per_tick);
        }
        due
    }

    /// Milliseconds accumulated toward the next tick.
    pub fn pending_ms(&self) -> u64 {
        self.elapsed_ms - self.total_ticks * self.ms_per_tick
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[cfg(target_arch = "wasm32")]
pub fn wall_clock_ms() -> u64 {
    js_sys::Date::now() as u64
}

/// Wall-clock milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
pub fn wall_clock_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
