//! Configuration for the corridor simulator.

/// Shape and demand of a [`GridSimulation`](crate::GridSimulation).
///
/// # Example
/// ```ignore
/// let config = GridConfig::new(3)
///     .with_arrival_rate(0.15)
///     .with_seed(7);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct GridConfig {
    /// Intersections along the east-west corridor.
    pub intersections: usize,
    /// Length of every approach and exit lane, in metres.
    pub lane_length: f32,
    /// Metres per tick.
    pub speed_limit: f32,
    /// Probability of a vehicle entering each boundary lane per tick.
    pub arrival_rate: f64,
    /// Base seed; each actor adds its index.
    pub seed: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            intersections: 2,
            lane_length: 150.0,
            speed_limit: 13.9,
            arrival_rate: 0.1,
            seed: 0,
        }
    }
}

impl GridConfig {
    pub fn new(intersections: usize) -> Self {
        Self {
            intersections,
            ..Default::default()
        }
    }

    pub fn with_lane_length(mut self, metres: f32) -> Self {
        self.lane_length = metres;
        self
    }

    pub fn with_speed_limit(mut self, metres_per_tick: f32) -> Self {
        self.speed_limit = metres_per_tick;
        self
    }

    pub fn with_arrival_rate(mut self, rate: f64) -> Self {
        self.arrival_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.intersections == 0 {
            return Err("intersections must be > 0");
        }
        if self.lane_length <= 0.0 {
            return Err("lane_length must be > 0");
        }
        if self.speed_limit <= 0.0 {
            return Err("speed_limit must be > 0");
        }
        if !(0.0..=1.0).contains(&self.arrival_rate) {
            return Err("arrival_rate must be in [0, 1]");
        }
        Ok(())
    }
}
