use crate::backend::MainDevice;
use crate::cli::AppArgs;
use crate::config::TrainingConfig;
use crate::mnist::MnistDataset;
use crate::model::MnistCnnConfig;
use crate::training::{EvalReport, train_and_evaluate};
use burn::tensor::backend::AutodiffBackend;
use log::info;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

/// Outcome of a full train+evaluate run on one device.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub label: String,
    pub elapsed: Duration,
    pub report: EvalReport,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2}% accuracy in {:.2}s",
            self.label,
            100.0 * self.report.accuracy(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Trains and evaluates on `AutoB::main_device()`, timing both.
///
/// The splits are loaded beforehand, the timer doesn't include reading them.
pub fn run_session<AutoB: AutodiffBackend + MainDevice>(
    label: &str,
    training_config: &TrainingConfig,
    model_config: &MnistCnnConfig,
    train_set: &MnistDataset,
    test_set: &MnistDataset,
    app_args: &AppArgs,
) -> io::Result<SessionSummary> {
    let device = AutoB::main_device();
    info!("Session {label} on {device:?}");

    let start = Instant::now();
    let (model, report) = train_and_evaluate::<AutoB>(
        training_config,
        model_config,
        &device,
        train_set.clone(),
        test_set.clone(),
    );
    let elapsed = start.elapsed();
    println!("Device {label} finished in {:.2}s", elapsed.as_secs_f64());

    app_args.save_model(&model, label)?;

    Ok(SessionSummary {
        label: label.to_string(),
        elapsed,
        report,
    })
}

/// How many times faster `fast` ran than `slow`.
pub fn speedup(slow: &SessionSummary, fast: &SessionSummary) -> f64 {
    slow.elapsed.as_secs_f64() / fast.elapsed.as_secs_f64().max(f64::EPSILON)
}
