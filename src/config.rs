use burn::optim::SgdConfig;
use burn::optim::momentum::MomentumConfig;
use burn::prelude::*;
use std::io;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub optimizer: SgdConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 512)]
    pub batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 0.03)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// A progress line is printed every `log_interval` batches.
    #[config(default = 100)]
    pub log_interval: usize,
}

/// Plain SGD with momentum 0.5 and no dampening.
pub fn optimizer_config() -> SgdConfig {
    SgdConfig::new().with_momentum(Some(
        MomentumConfig::new()
            .with_momentum(0.5)
            .with_dampening(0.0),
    ))
}

impl TrainingConfig {
    /// Rejects values that would stall or break the training loop.
    pub fn validate(&self) -> io::Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.log_interval == 0 {
            return Err(invalid("log_interval must be at least 1"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(invalid(format!("lr must be positive, got {}", self.lr)));
        }
        Ok(())
    }
}

pub(crate) fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(optimizer_config())
    }
}
