//! Simulation clock
//!
//! Converts wall-clock frame time into simulation steps. The round timer and
//! countdown are driven from the same steps through [`SecondTicker`], so there
//! is no second timer source that could drift from the frame loop.

/// Upper bound on catch-up steps per advance
pub const MAX_STEPS_PER_ADVANCE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestepMode {
    /// Emit whole steps of `dt`, carrying the remainder
    Fixed { dt: f32 },
    /// One step per advance, capped at `max_dt`
    Variable { max_dt: f32 },
}

#[derive(Debug, Clone)]
pub struct SimulationClock {
    mode: TimestepMode,
    accumulator: f32,
    running: bool,
}

impl SimulationClock {
    pub fn new(mode: TimestepMode) -> Self {
        Self {
            mode,
            accumulator: 0.0,
            running: false,
        }
    }

    pub fn fixed(dt: f32) -> Self {
        Self::new(TimestepMode::Fixed { dt })
    }

    pub fn start(&mut self) {
        self.accumulator = 0.0;
        self.running = true;
    }

    /// Stop and drop any carried time
    pub fn stop(&mut self) {
        self.running = false;
        self.accumulator = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Feed elapsed wall time, get the step sizes to simulate
    pub fn advance(&mut self, elapsed: f32) -> Vec<f32> {
        if !self.running || elapsed <= 0.0 {
            return Vec::new();
        }

        match self.mode {
            TimestepMode::Fixed { dt } => {
                self.accumulator += elapsed;
                let mut steps = Vec::new();
                while self.accumulator >= dt && (steps.len() as u32) < MAX_STEPS_PER_ADVANCE {
                    self.accumulator -= dt;
                    steps.push(dt);
                }
                // spiral of death: drop what we could not catch up
                if self.accumulator >= dt {
                    self.accumulator = 0.0;
                }
                steps
            }
            TimestepMode::Variable { max_dt } => vec![elapsed.min(max_dt)],
        }
    }
}

/// Counts whole seconds of simulated time
#[derive(Debug, Clone, Default)]
pub struct SecondTicker {
    elapsed: f32,
}

impl SecondTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add simulated time, returns how many second boundaries were crossed
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.elapsed += dt;
        let mut crossed = 0;
        while self.elapsed >= 1.0 {
            self.elapsed -= 1.0;
            crossed += 1;
        }
        crossed
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}
