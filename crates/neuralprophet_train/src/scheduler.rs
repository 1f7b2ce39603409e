//! Learning rate schedulers.

use serde::{Deserialize, Serialize};

/// Trait for learning rate schedulers.
pub trait Scheduler: Send + Sync {
    /// Get the learning rate for the current step.
    fn get_lr(&self, step: usize) -> f64;

    /// Get the scheduler name.
    fn name(&self) -> &str;
}

fn cosine_anneal(start: f64, end: f64, progress: f64) -> f64 {
    end + (start - end) * (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0
}

/// Configuration for OneCycleLR scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneCycleLRConfig {
    /// Maximum learning rate.
    pub max_lr: f64,
    /// Total number of steps.
    pub total_steps: usize,
    /// Percentage of steps for warmup.
    pub pct_start: f64,
    /// Division factor for initial LR.
    pub div_factor: f64,
    /// Final division factor, relative to the initial LR.
    pub final_div_factor: f64,
}

impl Default for OneCycleLRConfig {
    fn default() -> Self {
        Self {
            max_lr: 1e-3,
            total_steps: 1000,
            pct_start: 0.3,
            div_factor: 100.0,
            final_div_factor: 5000.0,
        }
    }
}

/// One-cycle learning rate scheduler.
///
/// The LR rises from `max_lr / div_factor` to `max_lr` over the first
/// `pct_start` of the steps, then falls to `initial_lr / final_div_factor`.
/// Both phases follow a cosine.
#[derive(Debug, Clone)]
pub struct OneCycleLR {
    config: OneCycleLRConfig,
    initial_lr: f64,
    final_lr: f64,
    warmup_steps: usize,
}

impl OneCycleLR {
    /// Create a new OneCycleLR scheduler.
    pub fn new(config: OneCycleLRConfig) -> Self {
        let initial_lr = config.max_lr / config.div_factor;
        let final_lr = initial_lr / config.final_div_factor;
        let warmup_steps = ((config.total_steps as f64 * config.pct_start) as usize).max(1);

        Self {
            config,
            initial_lr,
            final_lr,
            warmup_steps,
        }
    }

    /// Create with just max_lr and total_steps.
    pub fn simple(max_lr: f64, total_steps: usize) -> Self {
        Self::new(OneCycleLRConfig {
            max_lr,
            total_steps,
            ..Default::default()
        })
    }
}

impl Scheduler for OneCycleLR {
    fn get_lr(&self, step: usize) -> f64 {
        let last = self.config.total_steps.saturating_sub(1);
        let step = step.min(last);

        if step < self.warmup_steps {
            let progress = step as f64 / self.warmup_steps as f64;
            cosine_anneal(self.initial_lr, self.config.max_lr, progress)
        } else {
            let annealing_steps = last.saturating_sub(self.warmup_steps).max(1);
            let progress = (step - self.warmup_steps) as f64 / annealing_steps as f64;
            cosine_anneal(self.config.max_lr, self.final_lr, progress)
        }
    }

    fn name(&self) -> &str {
        "OneCycleLR"
    }
}

/// Exponential sweep used by the learning rate range test.
///
/// `lr(step) = start_lr · (end_lr / start_lr)^(step / (num_steps - 1))`
#[derive(Debug, Clone)]
pub struct ExponentialSweepLR {
    start_lr: f64,
    end_lr: f64,
    num_steps: usize,
}

impl ExponentialSweepLR {
    /// Create a sweep from `start_lr` to `end_lr` over `num_steps` steps.
    pub fn new(start_lr: f64, end_lr: f64, num_steps: usize) -> Self {
        Self {
            start_lr,
            end_lr,
            num_steps,
        }
    }

    /// Number of steps in the sweep.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }
}

impl Scheduler for ExponentialSweepLR {
    fn get_lr(&self, step: usize) -> f64 {
        let denom = self.num_steps.saturating_sub(1).max(1) as f64;
        let progress = (step as f64 / denom).min(1.0);
        self.start_lr * (self.end_lr / self.start_lr).powf(progress)
    }

    fn name(&self) -> &str {
        "ExponentialSweepLR"
    }
}

/// Constant learning rate.
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    /// Create a constant scheduler.
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Scheduler for ConstantLR {
    fn get_lr(&self, _step: usize) -> f64 {
        self.lr
    }

    fn name(&self) -> &str {
        "ConstantLR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_cycle_lr() {
        let scheduler = OneCycleLR::simple(1e-2, 1000);

        assert!((scheduler.get_lr(0) - 1e-4).abs() < 1e-12);

        // Peak at 30% of steps
        assert!((scheduler.get_lr(300) - 1e-2).abs() < 1e-12);
        assert!(scheduler.get_lr(150) > 1e-4 && scheduler.get_lr(150) < 1e-2);

        assert!((scheduler.get_lr(999) - 1e-4 / 5000.0).abs() < 1e-12);
        assert!((scheduler.get_lr(5000) - scheduler.get_lr(999)).abs() < 1e-15);
    }

    #[test]
    fn test_one_cycle_single_step() {
        let scheduler = OneCycleLR::simple(1e-2, 1);
        assert!((scheduler.get_lr(0) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_exponential_sweep() {
        let scheduler = ExponentialSweepLR::new(1e-7, 10.0, 9);
        assert!((scheduler.get_lr(0) - 1e-7).abs() < 1e-15);
        assert!((scheduler.get_lr(4) - 1e-3).abs() < 1e-9);
        assert!((scheduler.get_lr(8) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_lr() {
        let scheduler = ConstantLR::new(0.1);
        assert_eq!(scheduler.get_lr(0), scheduler.get_lr(100));
        assert_eq!(scheduler.name(), "ConstantLR");
    }
}
