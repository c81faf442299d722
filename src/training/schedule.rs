/// Halve-on-plateau learning rate schedule over a minimised metric.
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    factor: f64,
    patience: usize,
    threshold: f64,
    min_lr: f64,
    best: f64,
    bad_epochs: usize,
}

impl PlateauScheduler {
    pub const DEFAULT_THRESHOLD: f64 = 1e-4;

    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            threshold: Self::DEFAULT_THRESHOLD,
            min_lr,
            best: f64::INFINITY,
            bad_epochs: 0,
        }
    }

    /// Record one epoch's metric and return the learning rate to use next.
    ///
    /// A metric counts as an improvement only when it beats the best seen
    /// by the relative threshold; after more than `patience` epochs without
    /// one, the rate is multiplied by `factor` (never below `min_lr`).
    pub fn step(&mut self, metric: f64, current_lr: f64) -> f64 {
        if metric < self.best * (1.0 - self.threshold) {
            self.best = metric;
            self.bad_epochs = 0;
            return current_lr;
        }
        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            self.bad_epochs = 0;
            let reduced = (current_lr * self.factor).max(self.min_lr);
            if current_lr - reduced > f64::EPSILON * current_lr {
                return reduced;
            }
        }
        current_lr
    }
}
