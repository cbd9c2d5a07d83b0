use super::dataset::{HEIGHT, MnistItem, WIDTH};
use crate::backend::Element;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Z-score normalized brightness.
    ///
    /// # Shape
    /// [batch_size, 1, HEIGHT, WIDTH]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let batch_size = items.len();
        let (images, labels): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label as i64))
            .unzip();

        let images: Vec<Element> = images.into_iter().flatten().collect();
        let images = TensorData::new(images, [batch_size, 1, HEIGHT, WIDTH])
            .convert::<B::FloatElem>();
        let targets = TensorData::new(labels, [batch_size]).convert::<B::IntElem>();

        MnistBatch {
            images: Tensor::from_data(images, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnist::dataset::normalize;

    type TestBackend = burn::backend::NdArray<f32>;

    #[test]
    fn stacks_items_in_order() {
        let device = burn::backend::ndarray::NdArrayDevice::Cpu;
        let items = vec![
            MnistItem {
                image: vec![normalize(0); HEIGHT * WIDTH],
                label: 2,
            },
            MnistItem {
                image: vec![normalize(255); HEIGHT * WIDTH],
                label: 8,
            },
        ];

        let batch: MnistBatch<TestBackend> = MnistBatcher::default().batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 1, HEIGHT, WIDTH]);
        assert_eq!(batch.targets.dims(), [2]);
        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![2, 8]);

        let second = batch
            .images
            .narrow(0, 1, 1)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(second.iter().all(|&v| v == normalize(255)));
    }
}
