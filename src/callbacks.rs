//! Epoch-end policies driven by the validation loss.

use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// Stops training once the monitored loss has not improved for `patience`
/// consecutive epochs, keeping a snapshot of the best epoch's weights.
#[derive(Debug, Clone)]
pub struct EarlyStopping<S> {
    patience: usize,
    min_delta: f64,
    best: f64,
    wait: usize,
    best_epoch: Option<usize>,
    snapshot: Option<S>,
}

impl<S> EarlyStopping<S> {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best: f64::INFINITY,
            wait: 0,
            best_epoch: None,
            snapshot: None,
        }
    }

    /// Records `loss` for `epoch` (0-based). `snapshot` is only called when the
    /// loss improves.
    pub fn observe(&mut self, epoch: usize, loss: f64, snapshot: impl FnOnce() -> S) -> Decision {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.wait = 0;
            self.best_epoch = Some(epoch);
            self.snapshot = Some(snapshot());
            return Decision::Continue;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            warn!(
                "early stopping at epoch {}: no improvement in val_loss for {} epochs",
                epoch + 1,
                self.wait
            );
            return Decision::Stop;
        }
        Decision::Continue
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Hands over the best snapshot, if any epoch ever improved.
    pub fn take_best(&mut self) -> Option<S> {
        self.snapshot.take()
    }
}

/// Multiplies the learning rate by `factor` after `patience` epochs without
/// improvement, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f64,
    patience: usize,
    min_lr: f64,
    min_delta: f64,
    best: f64,
    wait: usize,
    lr: f64,
}

impl ReduceLrOnPlateau {
    pub fn new(initial_lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            min_delta: 1e-4,
            best: f64::INFINITY,
            wait: 0,
            lr: initial_lr,
        }
    }

    /// Minimum decrease that counts as an improvement.
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Records `loss` and returns the learning rate for the next epoch.
    pub fn observe(&mut self, loss: f64) -> f64 {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.wait = 0;
            return self.lr;
        }

        self.wait += 1;
        if self.wait >= self.patience && self.lr > self.min_lr {
            let reduced = (self.lr * self.factor).max(self.min_lr);
            info!("reducing learning rate {:.2e} -> {:.2e}", self.lr, reduced);
            self.lr = reduced;
            self.wait = 0;
        }
        self.lr
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }
}
