//! Userspace driver for an AXI-style scatter-gather PCIe DMA engine (XDMA),
//! exposed to this process through a kernel UIO shim.
//!
//! Covers BAR discovery, MMIO register access, huge-page buffer management
//! with physical-address resolution, and scatter-gather descriptor ring
//! construction for Card-to-Host transfers. Interrupt-driven completion,
//! multi-channel concurrency, and Host-to-Card wiring are not implemented —
//! callers poll the writeback region and the status register themselves.

pub mod barmap;
pub mod buffer;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod hugepage;
pub mod regfile;

pub use barmap::BarMap;
pub use buffer::{ScatterBuffer, SingleBuffer};
pub use config::ScatterBufferConfig;
pub use device::{Device, DeviceFactory};
pub use error::{BarMapError, BufferError, DeviceError, HugePageError};
pub use hugepage::{HugePage, HugePageSize};
pub use regfile::{RegFile, Target};
