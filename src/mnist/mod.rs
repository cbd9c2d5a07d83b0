pub mod batcher;
pub mod dataset;

pub use batcher::{MnistBatch, MnistBatcher};
pub use dataset::{HEIGHT, MnistDataset, MnistItem, NUM_CLASSES, Split, WIDTH};
