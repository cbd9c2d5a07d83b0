use crate::backend::Element;
use burn::data::dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use burn_dataset::network::downloader::download_file_as_bytes;
use flate2::read::GzDecoder;
use log::{debug, info};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Brightness statistics of the training split, in the [0, 1] range.
pub const MEAN: f64 = 0.1307;
pub const STD: f64 = 0.3081;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }

    fn files(&self) -> (&'static str, &'static str) {
        match self {
            Split::Train => (TRAIN_IMAGES, TRAIN_LABELS),
            Split::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

/// MNIST item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MnistItem {
    /// Image as a flat array of z-score normalized brightness values.
    ///
    /// # Shape
    /// [HEIGHT * WIDTH]
    pub image: Vec<Element>,

    /// Label of the image, in between 0 and 9.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct MnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

/// Maps each raw brightness `v` to `(v / 255 - MEAN) / STD`.
pub fn normalize(brightness: u8) -> Element {
    let value: f64 = brightness.as_();
    ((value / 255.0 - MEAN) / STD).as_()
}

struct Normalize;

impl Mapper<MnistItemRaw, MnistItem> for Normalize {
    fn map(&self, item: &MnistItemRaw) -> MnistItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);

        MnistItem {
            image: item.image_bytes.iter().copied().map(normalize).collect(),
            label: item.label,
        }
    }
}

enum Source {
    Files(MapperDataset<InMemDataset<MnistItemRaw>, Normalize, MnistItemRaw>),
    Items(InMemDataset<MnistItem>),
}

/// The MNIST dataset: 60,000 training and 10,000 test images of handwritten digits.
///
/// Files are looked up under `<root>/mnist/<split>/` and downloaded from the
/// [CVDF mirror](https://github.com/cvdfoundation/mnist) when missing.
/// Normalization is applied as items are read. Clones share the loaded items.
#[derive(Clone)]
pub struct MnistDataset {
    source: Arc<Source>,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        match self.source.as_ref() {
            Source::Files(dataset) => dataset.get(index),
            Source::Items(dataset) => dataset.get(index),
        }
    }

    fn len(&self) -> usize {
        match self.source.as_ref() {
            Source::Files(dataset) => dataset.len(),
            Source::Items(dataset) => dataset.len(),
        }
    }
}

impl MnistDataset {
    pub fn train<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        Self::new(root, Split::Train)
    }

    pub fn test<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        Self::new(root, Split::Test)
    }

    pub fn new<P: AsRef<Path>>(root: P, split: Split) -> io::Result<Self> {
        let split_dir = download(root.as_ref(), split)?;
        let (images_name, labels_name) = split.files();

        // MNIST is tiny so it's kept in memory
        // train images (u8): 28 * 28 * 60000 = 47.04Mb
        let images = read_images(split_dir.join(images_name))?;
        let labels = read_labels(split_dir.join(labels_name))?;
        if images.len() != labels.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} images but {} labels in {split_dir:?}",
                    images.len(),
                    labels.len()
                ),
            ));
        }
        info!("Loaded {} {:?} items from {split_dir:?}", images.len(), split);

        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| MnistItemRaw { image_bytes, label })
            .collect();
        let dataset = MapperDataset::new(InMemDataset::new(items), Normalize);

        Ok(Self {
            source: Arc::new(Source::Files(dataset)),
        })
    }

    /// Wraps already normalized items.
    pub fn from_items(items: Vec<MnistItem>) -> Self {
        Self {
            source: Arc::new(Source::Items(InMemDataset::new(items))),
        }
    }
}

/// Makes sure both files of the split exist, returning the split directory.
fn download(root: &Path, split: Split) -> io::Result<PathBuf> {
    let split_dir = root.join("mnist").join(split.dir_name());
    create_dir_all(&split_dir)?;

    let (images_name, labels_name) = split.files();
    download_file(images_name, &split_dir)?;
    download_file(labels_name, &split_dir)?;

    Ok(split_dir)
}

fn download_file(name: &str, dest_dir: &Path) -> io::Result<PathBuf> {
    let file_name = dest_dir.join(name);

    if is_cached(&file_name) {
        debug!("Found {file_name:?}");
    } else {
        info!("Downloading {name} into {dest_dir:?}");
        let bytes = download_file_as_bytes(&format!("{URL}{name}.gz"), name);
        decompress_into(&bytes, &file_name)?;
    }

    Ok(file_name)
}

/// Only complete files are cached, partial ones keep the `.part` suffix.
fn is_cached(file_name: &Path) -> bool {
    file_name.is_file()
}

fn part_path(file_name: &Path) -> PathBuf {
    let mut part = file_name.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Decompresses gzip `bytes` next to `file_name`, renaming into place once complete.
fn decompress_into(bytes: &[u8], file_name: &Path) -> io::Result<()> {
    let part = part_path(file_name);
    let result = File::create(&part).and_then(|mut output_file| {
        let mut gz_buffer = GzDecoder::new(bytes);
        io::copy(&mut gz_buffer, &mut output_file)?;
        output_file.sync_all()
    });

    match result {
        Ok(()) => std::fs::rename(&part, file_name),
        Err(err) => {
            let _ = std::fs::remove_file(&part);
            Err(err)
        }
    }
}

/// Fails before allocating when the file can't hold `count` records after the header.
fn check_payload(
    f: &File,
    header_len: u64,
    count: usize,
    record_len: usize,
    path: &Path,
) -> io::Result<()> {
    let file_len = f.metadata()?.len();
    let expected = (count as u64)
        .checked_mul(record_len as u64)
        .and_then(|payload| payload.checked_add(header_len));
    match expected {
        Some(expected) if expected <= file_len => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{path:?} declares {count} records but holds {file_len} bytes"),
        )),
    }
}

fn read_header<R: Read>(reader: &mut R, magic: u32, path: &Path) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    let found = u32::from_be_bytes(buf);
    if found != magic {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad magic number {found} in {path:?}, expected {magic}"),
        ));
    }
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads an IDX3 image file. Each image is a vector of `HEIGHT * WIDTH` bytes.
pub fn read_images<P: AsRef<Path>>(path: P) -> io::Result<Vec<Vec<u8>>> {
    let path = path.as_ref();
    let mut f = File::open(path)?;
    let size = read_header(&mut f, IMAGES_MAGIC, path)? as usize;

    // rows and columns
    let mut buf = [0u8; 8];
    f.read_exact(&mut buf)?;
    let rows = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let cols = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if (rows, cols) != (HEIGHT, WIDTH) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("images in {path:?} are {rows}x{cols}, expected {HEIGHT}x{WIDTH}"),
        ));
    }

    check_payload(&f, 16, size, WIDTH * HEIGHT, path)?;
    let mut buf_images: Vec<u8> = vec![0u8; WIDTH * HEIGHT * size];
    f.read_exact(&mut buf_images)?;

    Ok(buf_images
        .chunks(WIDTH * HEIGHT)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Reads an IDX1 label file.
pub fn read_labels<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    let path = path.as_ref();
    let mut f = File::open(path)?;
    let size = read_header(&mut f, LABELS_MAGIC, path)? as usize;

    check_payload(&f, 8, size, 1, path)?;
    let mut buf_labels: Vec<u8> = vec![0u8; size];
    f.read_exact(&mut buf_labels)?;

    Ok(buf_labels)
}
