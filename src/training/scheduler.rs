//! Learning-rate scheduling
//!
//! Reduces the learning rate when the monitored training loss stops
//! improving. Stepped once per epoch with the epoch's accumulated running
//! loss, which only needs to be comparable across epochs, not a mean.

/// Reduce-on-plateau learning-rate schedule
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    current_lr: f64,
    /// Multiplier applied on plateau
    factor: f64,
    /// Non-improving epochs tolerated before reducing
    patience: usize,
    /// Lower bound for the learning rate
    min_lr: f64,
    best: f64,
    bad_epochs: usize,
}

impl ReduceOnPlateau {
    pub fn new(initial_lr: f64) -> Self {
        ReduceOnPlateau {
            current_lr: initial_lr,
            factor: 0.5,
            patience: 2,
            min_lr: 1e-6,
            best: f64::INFINITY,
            bad_epochs: 0,
        }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.current_lr
    }

    /// Observe the epoch's monitored value
    pub fn step(&mut self, metric: f64) {
        if metric < self.best {
            self.best = metric;
            self.bad_epochs = 0;
            return;
        }

        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            let reduced = (self.current_lr * self.factor).max(self.min_lr);
            if reduced < self.current_lr {
                log::info!(
                    "Reducing learning rate: {:.2e} -> {:.2e}",
                    self.current_lr,
                    reduced
                );
            }
            self.current_lr = reduced;
            self.bad_epochs = 0;
        }
    }
}
