//! Per-peer round countdown.
//!
//! Each peer ticks its own counter once a second. The host's `syncTime`
//! nudges clients back toward its own value; nobody waits on agreement.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Running(u32),
    /// Emitted once, on the tick that reaches zero.
    Expired,
}

#[derive(Debug, Clone, Default)]
pub struct RoundTimer {
    remaining: u32,
    running: bool,
}

impl RoundTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh countdown of `secs`.
    pub fn reset(&mut self, secs: u32) {
        self.remaining = secs;
        self.running = secs > 0;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.remaining = 0;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&mut self) -> Tick {
        if !self.running {
            return Tick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    /// Apply the host's reported time. The correction lands a second late, so
    /// one is taken off; if that leaves nothing, the full round is restarted.
    pub fn correct(&mut self, host_time: u32, round_time: u32) {
        let adjusted = host_time.saturating_sub(1);
        self.reset(if adjusted == 0 { round_time } else { adjusted });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_once() {
        let mut t = RoundTimer::new();
        assert_eq!(t.tick(), Tick::Idle);
        t.reset(2);
        assert_eq!(t.tick(), Tick::Running(1));
        assert_eq!(t.tick(), Tick::Expired);
        assert_eq!(t.tick(), Tick::Idle);
    }

    #[test]
    fn correction_subtracts_smoothing_delay() {
        let mut t = RoundTimer::new();
        t.reset(30);
        t.correct(12, 30);
        assert_eq!(t.remaining(), 11);
        t.correct(1, 30);
        assert_eq!(t.remaining(), 30);
        assert!(t.is_running());
    }

    #[test]
    fn stop_silences_ticks() {
        let mut t = RoundTimer::new();
        t.reset(5);
        t.stop();
        assert_eq!(t.tick(), Tick::Idle);
    }
}
