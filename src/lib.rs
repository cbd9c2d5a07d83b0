//! Convolutional MNIST classifier trained with burn, on the cpu and on an accelerator.

pub mod backend;
pub mod cli;
pub mod config;
pub mod loss;
pub mod mnist;
pub mod model;
pub mod session;
pub mod training;

pub mod prelude {
    pub use crate::config::{TrainingConfig, optimizer_config};
    pub use crate::mnist::{MnistBatch, MnistBatcher, MnistDataset, MnistItem, Split};
    pub use crate::model::{MnistCnn, MnistCnnConfig};
    pub use crate::session::{SessionSummary, run_session, speedup};
    pub use crate::training::{EvalReport, evaluate, train, train_and_evaluate};
}
