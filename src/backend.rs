use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;

pub type Element = f32;

/// Recorder used for the model artifacts.
pub type RecorderTy = CompactRecorder;

/// General-purpose processor backend, always compiled in.
pub type CpuBackend = burn::backend::NdArray<Element, i32>;
pub type CpuAutoBackend = burn::backend::Autodiff<CpuBackend>;

// at most one accelerator is selected, in the order wgpu > cuda > tch-gpu
#[cfg(feature = "wgpu")]
pub type AccelBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(all(feature = "cuda", not(feature = "wgpu")))]
pub type AccelBackend = burn::backend::Cuda<Element, i32>;
#[cfg(all(feature = "tch-gpu", not(any(feature = "wgpu", feature = "cuda"))))]
pub type AccelBackend = burn::backend::libtorch::LibTorch<Element, i32>;

#[cfg(any(feature = "wgpu", feature = "cuda", feature = "tch-gpu"))]
pub type AccelAutoBackend = burn::backend::Autodiff<AccelBackend>;

/// The device that holds the model and the batches for a whole session.
pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

impl MainDevice for CpuBackend {}

impl MainDevice for CpuAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}

#[cfg(any(feature = "wgpu", feature = "cuda"))]
impl MainDevice for AccelBackend {}

#[cfg(all(
    feature = "tch-gpu",
    not(any(feature = "wgpu", feature = "cuda")),
    not(target_os = "macos")
))]
impl MainDevice for AccelBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    }
}

#[cfg(all(
    feature = "tch-gpu",
    not(any(feature = "wgpu", feature = "cuda")),
    target_os = "macos"
))]
impl MainDevice for AccelBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Mps
    }
}

#[cfg(any(feature = "wgpu", feature = "cuda", feature = "tch-gpu"))]
impl MainDevice for AccelAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}
