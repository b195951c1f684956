//! Step learning-rate decay.

#[derive(Debug, Clone)]
pub struct StepLr {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    steps: usize,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            steps: 0,
        }
    }

    /// Halve every 10 epochs.
    pub fn halving(base_lr: f64) -> Self {
        Self::new(base_lr, 10, 0.5)
    }

    pub fn current(&self) -> f64 {
        self.base_lr * self.gamma.powi((self.steps / self.step_size) as i32)
    }

    /// Advance by one epoch and return the new rate.
    pub fn step(&mut self) -> f64 {
        let before = self.current();
        self.steps += 1;
        let after = self.current();
        if after != before {
            tracing::info!("decay learning rate from {before:.3e} to {after:.3e}");
        }
        after
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_every_ten_steps() {
        let mut lr = StepLr::halving(1e-4);
        assert_eq!(lr.current(), 1e-4);
        for _ in 0..9 {
            lr.step();
        }
        assert_eq!(lr.current(), 1e-4);
        assert_eq!(lr.step(), 5e-5);
        for _ in 0..10 {
            lr.step();
        }
        assert_eq!(lr.current(), 2.5e-5);
        assert_eq!(lr.steps(), 20);
    }
}
