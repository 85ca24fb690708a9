//! Edge-triggered gate for loads that depend on an external context finishing first.

#[derive(Debug, Clone)]
pub struct ReadinessGate {
    not_ready: bool,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    /// Starts closed: the first `observe(false)` is the leading edge.
    pub fn new() -> Self {
        Self { not_ready: true }
    }

    /// Returns `true` only on a `not_ready: true -> false` transition.
    pub fn observe(&mut self, not_ready: bool) -> bool {
        let fire = self.not_ready && !not_ready;
        self.not_ready = not_ready;
        fire
    }

    pub fn is_ready(&self) -> bool {
        !self.not_ready
    }
}
