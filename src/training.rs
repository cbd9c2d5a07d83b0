use crate::config::TrainingConfig;
use crate::mnist::{MnistBatch, MnistBatcher, MnistDataset};
use crate::model::{MnistCnn, MnistCnnConfig};
use burn::prelude::*;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    nn::loss::Reduction,
    optim::{GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
    train::metric::{Adaptor, Metric, MetricMetadata, Numeric},
};
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

pub type Dataloader<B> = Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

/// Shuffled loader, reshuffled on every epoch.
pub fn training_loader<B: Backend>(
    dataset: MnistDataset,
    config: &TrainingConfig,
    device: &B::Device,
) -> Dataloader<B> {
    DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset)
}

/// Loader keeping the dataset order, so it runs without workers.
pub fn evaluation_loader<B: Backend>(
    dataset: MnistDataset,
    config: &TrainingConfig,
    device: &B::Device,
) -> Dataloader<B> {
    DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(config.batch_size)
        .set_device(device.clone())
        .build(dataset)
}

/// Trains a fresh model on `dataset`.
pub fn train<AutoB: AutodiffBackend>(
    training_config: &TrainingConfig,
    model_config: &MnistCnnConfig,
    device: &AutoB::Device,
    dataset: MnistDataset,
) -> MnistCnn<AutoB> {
    AutoB::seed(device, training_config.seed);

    let dataloader_train = training_loader::<AutoB>(dataset, training_config, device);

    let mut model = model_config.init::<AutoB>(device);
    let mut optim = training_config.optimizer.init::<AutoB, MnistCnn<AutoB>>();

    debug!("{model}");
    info!(
        "Training on {} items for {} epochs",
        dataloader_train.num_items(),
        training_config.num_epochs
    );
    for epoch in 1..training_config.num_epochs + 1 {
        model = epoch_train(
            Arc::clone(&dataloader_train),
            model,
            &mut optim,
            training_config,
            epoch,
        );
    }

    model
}

/// Whether the loss of batch `batch_index` gets a progress line.
pub fn should_log(batch_index: usize, log_interval: usize) -> bool {
    log_interval > 0 && batch_index % log_interval == 0
}

/// The progress line printed while training.
pub fn loss_line(epoch: usize, loss: f64) -> String {
    format!("Epoch {epoch} Loss: {loss:.6}")
}

/// Runs one pass over the training loader, returning the updated model.
pub fn epoch_train<AutoB: AutodiffBackend, O: Optimizer<MnistCnn<AutoB>, AutoB>>(
    dataloader_train: Dataloader<AutoB>,
    mut model: MnistCnn<AutoB>,
    optim: &mut O,
    config: &TrainingConfig,
    epoch: usize,
) -> MnistCnn<AutoB> {
    let mut metric_meta = MetricMetadata {
        progress: burn::data::dataloader::Progress::new(0, dataloader_train.num_items()),
        epoch,
        epoch_total: config.num_epochs,
        iteration: 0,
        lr: Some(config.lr),
    };
    let mut loss_metric = burn::train::metric::LossMetric::<AutoB>::new();
    let mut acc_metric = burn::train::metric::AccuracyMetric::<AutoB>::new();

    for (b, batch) in dataloader_train.iter().enumerate() {
        let [batch_size] = batch.targets.dims();
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let pre_metrics = model.forward_classification(batch, Reduction::Mean);
        loss_metric.update(&pre_metrics.adapt(), &metric_meta);
        acc_metric.update(&pre_metrics.adapt(), &metric_meta);

        // gradients are produced fresh on every backward pass
        let loss = pre_metrics.loss;
        if should_log(b, config.log_interval) {
            let value: f64 = loss.clone().into_scalar().elem();
            println!("{}", loss_line(epoch, value));
        }
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(config.lr, model, grads);
    }

    info!(
        "Epoch {}/{}, Avg Loss {:.4}, Avg Acc {:.2}",
        epoch,
        config.num_epochs,
        loss_metric.running_value().current(),
        acc_metric.running_value().current(),
    );

    model
}

/// Summed loss and top-1 hits over an evaluation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvalReport {
    pub total_loss: f64,
    pub correct: usize,
    pub total: usize,
}

impl EvalReport {
    pub fn average_loss(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_loss / self.total as f64
        }
    }

    /// Fraction of correct predictions, in [0, 1].
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Test set: Average loss: {:.4}, Accuracy: {}/{} ({:.0}%)",
            self.average_loss(),
            self.correct,
            self.total,
            100.0 * self.accuracy()
        )
    }
}

/// Evaluates a model without gradient tracking; use [`AutodiffModule::valid`]
/// to get one out of a training model.
pub fn evaluate<B: Backend>(dataloader: Dataloader<B>, model: &MnistCnn<B>) -> EvalReport {
    let mut report = EvalReport {
        total_loss: 0.0,
        correct: 0,
        total: 0,
    };

    for batch in dataloader.iter() {
        let [batch_size] = batch.targets.dims();
        let output = model.forward_classification(batch, Reduction::Sum);

        let loss: f64 = output.loss.into_scalar().elem();
        let predictions = output.output.argmax(1).reshape([batch_size]);
        let correct: i64 = predictions
            .equal(output.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        report.total_loss += loss;
        report.correct += correct as usize;
        report.total += batch_size;
    }

    report
}

/// Trains then evaluates, printing the summary line.
pub fn train_and_evaluate<AutoB: AutodiffBackend>(
    training_config: &TrainingConfig,
    model_config: &MnistCnnConfig,
    device: &AutoB::Device,
    train_set: MnistDataset,
    test_set: MnistDataset,
) -> (MnistCnn<AutoB>, EvalReport) {
    let model = train::<AutoB>(training_config, model_config, device, train_set);

    let dataloader_test =
        evaluation_loader::<AutoB::InnerBackend>(test_set, training_config, device);
    let report = evaluate(dataloader_test, &model.valid());
    println!("{report}");

    (model, report)
}
