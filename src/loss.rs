use burn::module::Module;
use burn::nn::loss::Reduction;
use burn::tensor::{Int, Tensor, backend::Backend};

/// Negative log-likelihood of the targets under log-probabilities.
#[derive(Module, Clone, Debug)]
pub struct NllLoss;

impl Default for NllLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl NllLoss {
    /// Create the criterion.
    pub fn new() -> Self {
        Self
    }

    /// Compute the criterion on the input tensor.
    ///
    /// # Shapes
    ///
    /// - log_probs: [batch_size, num_classes]
    /// - targets: [batch_size]
    pub fn forward<B: Backend>(
        &self,
        log_probs: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let tensor = self.forward_no_reduction(log_probs, targets);
        match reduction {
            Reduction::Mean | Reduction::Auto => tensor.mean(),
            Reduction::Sum => tensor.sum(),
        }
    }

    /// Compute the per-sample criterion without reducing.
    ///
    /// # Shapes
    ///
    /// - output: [batch_size]
    pub fn forward_no_reduction<B: Backend>(
        &self,
        log_probs: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let [batch_size, _num_classes] = log_probs.dims();
        assert_eq!([batch_size], targets.dims());

        let picked = log_probs.gather(1, targets.reshape([batch_size, 1]));
        picked.reshape([batch_size]).neg()
    }
}
