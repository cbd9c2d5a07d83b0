use crate::config::invalid;
use crate::loss::NllLoss;
use crate::mnist::{HEIGHT, MnistBatch, NUM_CLASSES, WIDTH};
use burn::{
    nn::{
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
        conv::{Conv2d, Conv2dConfig},
        loss::Reduction,
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    tensor::activation::log_softmax,
    train::ClassificationOutput,
};

/// Two convolution stages followed by a two layer classifier head.
#[derive(Config, Debug)]
pub struct MnistCnnConfig {
    #[config(default = 10)]
    pub conv1_channels: usize,
    #[config(default = 20)]
    pub conv2_channels: usize,
    #[config(default = 5)]
    pub kernel_size: usize,
    #[config(default = 50)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
}

impl Default for MnistCnnConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MnistCnnConfig {
    /// Side of the feature maps after both conv+pool stages (4 for the defaults).
    /// Zero when the kernel doesn't fit.
    pub fn feature_side(&self) -> usize {
        let stage = |side: usize| {
            side.checked_sub(self.kernel_size)
                .map_or(0, |left| (left + 1) / 2)
        };
        stage(stage(HEIGHT.min(WIDTH)))
    }

    /// Rejects topologies that can't be built for 28x28 images.
    pub fn validate(&self) -> std::io::Result<()> {
        if self.kernel_size == 0 || self.feature_side() == 0 {
            return Err(invalid(format!(
                "kernel_size {} leaves no features on {HEIGHT}x{WIDTH} images",
                self.kernel_size
            )));
        }
        if self.conv1_channels == 0 || self.conv2_channels == 0 || self.hidden_size == 0 {
            return Err(invalid("channel and hidden sizes must be at least 1"));
        }
        if self.num_classes != NUM_CLASSES {
            return Err(invalid(format!(
                "num_classes must be {NUM_CLASSES}, got {}",
                self.num_classes
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Size of the flattened features fed to the first linear layer (320 for the defaults).
    pub fn flatten_size(&self) -> usize {
        self.conv2_channels * self.feature_side() * self.feature_side()
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MnistCnn<B> {
        let kernel = [self.kernel_size, self.kernel_size];
        MnistCnn {
            conv1: Conv2dConfig::new([1, self.conv1_channels], kernel).init(device),
            conv2: Conv2dConfig::new([self.conv1_channels, self.conv2_channels], kernel)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
            fc1: LinearConfig::new(self.flatten_size(), self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
        }
    }
}

/// The digit classifier.
///
/// Training or evaluation mode follows the backend: on an autodiff backend the
/// dropout is active, while the module obtained from
/// [`valid`](burn::module::AutodiffModule::valid) shares the same weights and
/// skips it.
#[derive(Module, Debug)]
pub struct MnistCnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub activation: Relu,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> MnistCnn<B> {
    /// # Shapes
    ///   - Input [batch_size, 1, HEIGHT, WIDTH]
    ///   - Output [batch_size, num_classes], log-probabilities
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, height, width] = images.dims();
        debug_assert_eq!([channels, height, width], [1, HEIGHT, WIDTH]);

        let x = self.conv1.forward(images);
        let x = self.activation.forward(self.pool.forward(x));
        let x = self.conv2.forward(x);
        let x = self.activation.forward(self.pool.forward(x));

        let [_, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        let x = self.fc2.forward(x);

        log_softmax(x, 1)
    }

    /// Forward pass plus the negative log-likelihood of the targets.
    pub fn forward_classification(
        &self,
        batch: MnistBatch<B>,
        reduction: Reduction,
    ) -> ClassificationOutput<B> {
        let targets = batch.targets;
        let output = self.forward(batch.images);
        let loss = NllLoss::new().forward(output.clone(), targets.clone(), reduction);

        ClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::AutodiffModule;

    type TestBackend = burn::backend::NdArray<f32>;
    type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;

    fn images<B: Backend>(batch_size: usize, device: &B::Device) -> Tensor<B, 4> {
        Tensor::random(
            [batch_size, 1, HEIGHT, WIDTH],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            device,
        )
    }

    #[test]
    fn default_topology() {
        let config = MnistCnnConfig::new();
        assert_eq!(config.feature_side(), 4);
        assert_eq!(config.flatten_size(), 320);
    }

    #[test]
    fn oversized_kernels_are_rejected() {
        assert!(MnistCnnConfig::new().validate().is_ok());
        assert!(MnistCnnConfig::new().with_kernel_size(9).validate().is_ok());

        for kernel_size in [0, 10, 28, 40] {
            let config = MnistCnnConfig::new().with_kernel_size(kernel_size);
            assert_eq!(config.feature_side(), if kernel_size == 0 { 7 } else { 0 });
            assert!(config.validate().is_err(), "kernel {kernel_size}");
        }
        assert!(MnistCnnConfig::new().with_dropout(1.0).validate().is_err());
        assert!(MnistCnnConfig::new().with_num_classes(3).validate().is_err());
    }

    #[test]
    fn outputs_log_probabilities_per_image() {
        let device = Default::default();
        let model = MnistCnnConfig::new().init::<TestBackend>(&device);

        for batch_size in [1, 3, 8] {
            let output = model.forward(images::<TestBackend>(batch_size, &device));
            assert_eq!(output.dims(), [batch_size, NUM_CLASSES]);

            let sums = output.exp().sum_dim(1).into_data().to_vec::<f32>().unwrap();
            assert_eq!(sums.len(), batch_size);
            for sum in sums {
                assert!((sum - 1.0).abs() < 1e-4, "probabilities sum to {sum}");
            }
        }
    }

    #[test]
    fn evaluation_forward_is_deterministic() {
        let device = Default::default();
        let model = MnistCnnConfig::new()
            .init::<TestAutodiffBackend>(&device)
            .valid();
        let input = images::<TestBackend>(4, &device);

        let first = model.forward(input.clone()).into_data();
        let second = model.forward(input).into_data();
        assert_eq!(first, second);
    }

    #[test]
    fn dropout_is_only_active_in_training_mode() {
        let device = Default::default();
        let model = MnistCnnConfig::new().init::<TestAutodiffBackend>(&device);
        let input = images::<TestAutodiffBackend>(16, &device);

        let first = model.forward(input.clone()).into_data();
        let second = model.forward(input.clone()).into_data();
        assert_ne!(first, second);

        let valid = model.valid();
        let input = input.inner();
        let first = valid.forward(input.clone()).into_data();
        let second = valid.forward(input).into_data();
        assert_eq!(first, second);
    }

    #[test]
    fn switching_mode_keeps_the_weights() {
        let device = Default::default();
        let model = MnistCnnConfig::new().init::<TestAutodiffBackend>(&device);
        let valid = model.valid();

        assert_eq!(
            model.conv1.weight.val().inner().into_data(),
            valid.conv1.weight.val().into_data()
        );
        assert_eq!(
            model.conv2.weight.val().inner().into_data(),
            valid.conv2.weight.val().into_data()
        );
        assert_eq!(
            model.fc1.weight.val().inner().into_data(),
            valid.fc1.weight.val().into_data()
        );
        assert_eq!(
            model.fc2.weight.val().inner().into_data(),
            valid.fc2.weight.val().into_data()
        );
    }

    #[test]
    fn without_dropout_both_modes_agree() {
        let device = Default::default();
        let model = MnistCnnConfig::new()
            .with_dropout(0.0)
            .init::<TestAutodiffBackend>(&device);
        let input = images::<TestAutodiffBackend>(4, &device);

        let training = model.forward(input.clone()).inner().into_data();
        let evaluation = model.valid().forward(input.inner()).into_data();
        assert_eq!(training, evaluation);
    }
}
