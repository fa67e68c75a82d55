//! Tick-driven timers advanced once per frame by the owning loop

/// What the countdown produced during an `advance`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// Number to announce; 0 means "go"
    Number(u32),
    /// One second after "go": the match should start
    Finished,
}

/// Counts N, N-1, ... 0 one second apart, then finishes one second later.
/// Can be cancelled and restarted at any time.
#[derive(Debug, Clone)]
pub struct Countdown {
    from: u32,
    current: u32,
    elapsed: f32,
    running: bool,
}

impl Countdown {
    pub fn new(from: u32) -> Self {
        Self {
            from,
            current: from,
            elapsed: 0.0,
            running: false,
        }
    }

    /// Starts (or restarts) from the configured number and returns it
    pub fn start(&mut self) -> CountdownEvent {
        self.current = self.from;
        self.elapsed = 0.0;
        self.running = true;
        CountdownEvent::Number(self.current)
    }

    pub fn cancel(&mut self) {
        self.running = false;
        self.elapsed = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn advance(&mut self, dt: f32) -> Vec<CountdownEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }

        self.elapsed += dt;
        while self.running && self.elapsed >= 1.0 {
            self.elapsed -= 1.0;
            if self.current > 0 {
                self.current -= 1;
                events.push(CountdownEvent::Number(self.current));
            } else {
                self.running = false;
                events.push(CountdownEvent::Finished);
            }
        }
        events
    }
}

/// Simple recharge timer for rate-limited actions
#[derive(Debug, Clone)]
pub struct Cooldown {
    duration: f32,
    remaining: f32,
}

impl Cooldown {
    pub fn new(duration: f32) -> Self {
        Self {
            duration,
            remaining: 0.0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.remaining <= 0.0
    }

    pub fn trigger(&mut self) {
        self.remaining = self.duration;
    }

    pub fn advance(&mut self, dt: f32) {
        self.remaining = (self.remaining - dt).max(0.0);
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// 0.0 right after triggering, 1.0 when ready
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (1.0 - self.remaining / self.duration).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}
