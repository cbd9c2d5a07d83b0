use burn_mnist_cnn::backend::CpuAutoBackend;
use burn_mnist_cnn::cli::AppArgs;
use burn_mnist_cnn::prelude::*;
use log::{info, warn};

#[cfg(any(feature = "wgpu", feature = "cuda", feature = "tch-gpu"))]
fn run_accelerator(
    training_config: &TrainingConfig,
    model_config: &MnistCnnConfig,
    train_set: &MnistDataset,
    test_set: &MnistDataset,
    app_args: &AppArgs,
) -> std::io::Result<Option<SessionSummary>> {
    use burn_mnist_cnn::backend::AccelAutoBackend;
    run_session::<AccelAutoBackend>(
        "accelerator",
        training_config,
        model_config,
        train_set,
        test_set,
        app_args,
    )
    .map(Some)
}

#[cfg(not(any(feature = "wgpu", feature = "cuda", feature = "tch-gpu")))]
fn run_accelerator(
    _training_config: &TrainingConfig,
    _model_config: &MnistCnnConfig,
    _train_set: &MnistDataset,
    _test_set: &MnistDataset,
    _app_args: &AppArgs,
) -> std::io::Result<Option<SessionSummary>> {
    warn!("no accelerator backend was built in, enable one of the wgpu, cuda or tch-gpu features");
    Ok(None)
}

pub fn launch(app_args: &AppArgs) -> std::io::Result<()> {
    app_args.create_artifact_dir()?;

    let training_config = app_args
        .load_training_config()?
        .unwrap_or_else(TrainingConfig::default);
    let model_config = app_args
        .load_model_config()?
        .unwrap_or_else(MnistCnnConfig::default);
    training_config.validate()?;
    model_config.validate()?;
    app_args.save_training_config(&training_config)?;
    app_args.save_model_config(&model_config)?;

    info!("Running on {} from {:?}", app_args.device, app_args.data_dir);
    let train_set = MnistDataset::train(&app_args.data_dir)?;
    let test_set = MnistDataset::test(&app_args.data_dir)?;

    let cpu = if app_args.device.includes_cpu() {
        Some(run_session::<CpuAutoBackend>(
            "cpu",
            &training_config,
            &model_config,
            &train_set,
            &test_set,
            app_args,
        )?)
    } else {
        None
    };

    let accelerator = if app_args.device.includes_accelerator() {
        run_accelerator(
            &training_config,
            &model_config,
            &train_set,
            &test_set,
            app_args,
        )?
    } else {
        None
    };

    for summary in cpu.iter().chain(accelerator.iter()) {
        info!("{summary}");
    }

    match (&cpu, &accelerator) {
        (Some(cpu), Some(accelerator)) => println!(
            "Accelerator speedup: {:.2}x ({:.2}s vs {:.2}s)",
            speedup(cpu, accelerator),
            cpu.elapsed.as_secs_f64(),
            accelerator.elapsed.as_secs_f64(),
        ),
        (_, None) => {
            if let Some(note) = app_args.device.without_accelerator() {
                warn!("{note}");
            }
        }
        _ => {}
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_args = AppArgs::parse().unwrap_or_else(|err| {
        eprintln!("{err}\n\n{}", burn_mnist_cnn::cli::HELP);
        std::process::exit(2);
    });
    launch(&app_args).expect("session failed");
}
