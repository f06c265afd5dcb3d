//! Software accelerator backend for npuarray
//!
//! Arrays live in device memory pools owned by a [`Context`]; kernels decode
//! device bytes with ndarray, run on the rayon pool, and use faer for matrix
//! products and QR.

mod allocator;
mod array;
pub mod broadcast;
mod compare;
mod context;
mod creation;
mod einsum;
mod kernel;
mod linalg;
mod math;
mod random;
mod stats;

pub use allocator::MemoryStats;
pub use array::{HostBuffer, NdArray};
pub use broadcast::{broadcast_shape, broadcast_shapes, BroadcastPlan};
pub use context::{Context, ContextConfig};

use npuarray_core::{ops::CreationOps, Backend};

/// Device backend over the software accelerator
pub struct DeviceBackend;

impl Backend for DeviceBackend {
    fn name() -> &'static str {
        "npu-sim"
    }

    fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn device_count(ctx: &<Self as CreationOps>::Context) -> u32 {
        ctx.device_count()
    }
}
