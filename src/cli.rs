use crate::backend::RecorderTy;
use burn::prelude::*;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const HELP: &str = "\
MNIST CNN

Trains a small convolutional classifier on the MNIST digits, on the cpu and then on
the accelerator, and reports the test accuracy and the time taken on each device.

USAGE:
    mnist-cnn [OPTIONS]

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -d, --device <DEVICE>       cpu, accelerator or both (default: both)
                                The accelerator backend is chosen at build time with
                                the wgpu, cuda or tch-gpu cargo features.
    -r, --data-dir <PATH>       Dataset root, the files are downloaded there when missing
                                (default: ./data)
    -c, --training-config <PATH>
                                Load the training configuration from this json file
    -m, --model-config <PATH>   Load the model configuration from this json file
    -a, --artifacts-path <PATH>
                                Save the configurations and the trained models into this
                                directory, created if needed

ENVIRONMENT:
    RUST_LOG                    Log filter (default: info)
";

pub const DEFAULT_DATA_DIR: &str = "data";

/// Where the sessions run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceChoice {
    Cpu,
    Accelerator,
    Both,
}

impl DeviceChoice {
    pub fn includes_cpu(&self) -> bool {
        matches!(self, DeviceChoice::Cpu | DeviceChoice::Both)
    }

    pub fn includes_accelerator(&self) -> bool {
        matches!(self, DeviceChoice::Accelerator | DeviceChoice::Both)
    }

    /// What is left of the run when no accelerator backend is available.
    pub fn without_accelerator(&self) -> Option<&'static str> {
        match self {
            DeviceChoice::Cpu => None,
            DeviceChoice::Accelerator => Some("no session ran"),
            DeviceChoice::Both => Some("only the cpu session ran"),
        }
    }
}

impl FromStr for DeviceChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceChoice::Cpu),
            "accelerator" | "gpu" => Ok(DeviceChoice::Accelerator),
            "both" => Ok(DeviceChoice::Both),
            other => Err(format!(
                "unknown device {other:?}, expected cpu, accelerator or both"
            )),
        }
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceChoice::Cpu => "cpu",
            DeviceChoice::Accelerator => "accelerator",
            DeviceChoice::Both => "both",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct AppArgs {
    pub device: DeviceChoice,
    pub data_dir: PathBuf,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: Option<PathBuf>,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        Self::from_arguments(pargs)
    }

    /// Parses an explicit argument list, without the program name.
    pub fn parse_from(args: Vec<OsString>) -> Result<Self, pico_args::Error> {
        Self::from_arguments(pico_args::Arguments::from_vec(args))
    }

    fn from_arguments(mut pargs: pico_args::Arguments) -> Result<Self, pico_args::Error> {
        let args = AppArgs {
            device: pargs
                .opt_value_from_str(["-d", "--device"])?
                .unwrap_or(DeviceChoice::Both),
            data_dir: pargs
                .opt_value_from_os_str(["-r", "--data-dir"], parse_path)?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?,
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(pico_args::Error::ArgumentParsingFailed {
                cause: format!("unused arguments: {remaining:?}"),
            });
        }

        Ok(args)
    }

    /// The explicit config file if one was given, `None` otherwise.
    pub fn load_training_config<C: Config>(&self) -> io::Result<Option<C>> {
        self.training_config
            .as_ref()
            .map(|path| load_config(path))
            .transpose()
    }

    pub fn load_model_config<C: Config>(&self) -> io::Result<Option<C>> {
        self.model_config
            .as_ref()
            .map(|path| load_config(path))
            .transpose()
    }

    pub fn create_artifact_dir(&self) -> io::Result<()> {
        match &self.artifacts_path {
            Some(path) => std::fs::create_dir_all(path),
            None => Ok(()),
        }
    }

    pub fn save_training_config(&self, training_config: &impl Config) -> io::Result<()> {
        match &self.artifacts_path {
            Some(dir) => save_config(&dir.join(TRAINING_CONFIG_NAME), training_config),
            None => Ok(()),
        }
    }

    pub fn save_model_config(&self, model_config: &impl Config) -> io::Result<()> {
        match &self.artifacts_path {
            Some(dir) => save_config(&dir.join(MODEL_CONFIG_NAME), model_config),
            None => Ok(()),
        }
    }

    /// Saves the model as `model-<label>` in the artifacts directory, if any.
    pub fn save_model<B: Backend>(&self, model: &impl Module<B>, label: &str) -> io::Result<()> {
        match &self.artifacts_path {
            Some(dir) => save_model(dir, model, label),
            None => Ok(()),
        }
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

pub const TRAINING_CONFIG_NAME: &str = "training_config.json";
pub const MODEL_CONFIG_NAME: &str = "model_config.json";
pub const MODEL_NAME: &str = "model";

pub fn save_config(path: &Path, config: &impl Config) -> io::Result<()> {
    log::info!("Saving config into {path:?}");
    config.save(path)
}

pub fn load_config<C: Config>(path: &Path) -> io::Result<C> {
    log::info!("Loading config from {path:?}");
    C::load(path)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{path:?}: {err:?}")))
}

pub fn save_model<B: Backend>(
    artifact_dir: &Path,
    model: &impl Module<B>,
    label: &str,
) -> io::Result<()> {
    // the recorder adds its own extension
    let path = artifact_dir.join(format!("{MODEL_NAME}-{label}"));
    log::info!("Saving model to {path:?}");
    model
        .clone()
        .save_file(path, &RecorderTy::new())
        .map_err(|err| io::Error::other(format!("failed to save the model: {err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn defaults_run_both_devices() {
        let app_args = AppArgs::parse_from(vec![]).unwrap();
        assert_eq!(app_args.device, DeviceChoice::Both);
        assert_eq!(app_args.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(app_args.training_config.is_none());
        assert!(app_args.artifacts_path.is_none());
    }

    #[test]
    fn parses_device_and_paths() {
        let app_args = AppArgs::parse_from(args(&[
            "--device",
            "cpu",
            "-r",
            "/tmp/mnist",
            "-a",
            "/tmp/artifacts",
        ]))
        .unwrap();
        assert_eq!(app_args.device, DeviceChoice::Cpu);
        assert_eq!(app_args.data_dir, PathBuf::from("/tmp/mnist"));
        assert_eq!(app_args.artifacts_path, Some(PathBuf::from("/tmp/artifacts")));
    }

    #[test]
    fn device_choice() {
        assert_eq!("GPU".parse::<DeviceChoice>(), Ok(DeviceChoice::Accelerator));
        assert!("tpu".parse::<DeviceChoice>().is_err());
        assert!(DeviceChoice::Both.includes_cpu());
        assert!(DeviceChoice::Both.includes_accelerator());
        assert!(!DeviceChoice::Cpu.includes_accelerator());
        assert!(!DeviceChoice::Accelerator.includes_cpu());
    }

    #[test]
    fn missing_accelerator_note_follows_the_choice() {
        assert_eq!(DeviceChoice::Cpu.without_accelerator(), None);
        assert_eq!(
            DeviceChoice::Accelerator.without_accelerator(),
            Some("no session ran")
        );
        assert_eq!(
            DeviceChoice::Both.without_accelerator(),
            Some("only the cpu session ran")
        );
        assert_eq!(DeviceChoice::Accelerator.to_string(), "accelerator");
        assert_eq!(
            DeviceChoice::Both.to_string().parse::<DeviceChoice>(),
            Ok(DeviceChoice::Both)
        );
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(AppArgs::parse_from(args(&["--epochs", "3"])).is_err());
        assert!(AppArgs::parse_from(args(&["-d", "tpu"])).is_err());
    }

    #[test]
    fn saves_and_loads_configs_in_the_artifacts_dir() {
        let dir = temp_dir::TempDir::new().unwrap();
        let artifacts = dir.path().join("artifacts");
        let mut app_args = AppArgs::parse_from(vec![]).unwrap();
        app_args.artifacts_path = Some(artifacts.clone());
        app_args.create_artifact_dir().unwrap();

        let config = TrainingConfig::default().with_num_epochs(2);
        app_args.save_training_config(&config).unwrap();

        app_args.training_config = Some(artifacts.join(TRAINING_CONFIG_NAME));
        let loaded: TrainingConfig = app_args.load_training_config().unwrap().unwrap();
        assert_eq!(loaded.num_epochs, 2);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let mut app_args = AppArgs::parse_from(vec![]).unwrap();
        app_args.training_config = Some(PathBuf::from("/definitely/not/here.json"));
        assert!(app_args.load_training_config::<TrainingConfig>().is_err());
    }
}
