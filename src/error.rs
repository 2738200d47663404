//! Error types for the XDMA userspace driver.
//!
//! Each variant is tagged in its doc comment with the error kind from
//! the design notes: environment, permission, resource, identification,
//! or input. There is no local retry anywhere in this crate — callers
//! see the first failure verbatim.

use std::fmt;
use std::io;

/// Failure allocating or resolving a huge page.
#[derive(Debug)]
pub enum HugePageError {
    /// resource: the anonymous huge-page mapping request failed.
    MapFailed(io::Error),
    /// permission: `/proc/self/pagemap` returned PFN 0 (no CAP_SYS_ADMIN).
    PhysResolveFailed,
    /// resource: reading `/proc/self/pagemap` itself failed.
    PagemapRead(io::Error),
}

impl fmt::Display for HugePageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapFailed(e) => write!(f, "huge-page mapping failed: {}", e),
            Self::PhysResolveFailed => write!(
                f,
                "cannot read physical address (are you missing CAP_SYS_ADMIN?)"
            ),
            Self::PagemapRead(e) => write!(f, "failed to read /proc/self/pagemap: {}", e),
        }
    }
}

impl std::error::Error for HugePageError {}

/// Failure mapping a PCIe BAR window.
#[derive(Debug)]
pub enum BarMapError {
    /// permission: `/dev/mem` could not be opened read-write.
    DevMemOpen(io::Error),
    /// resource: the `mmap` of the BAR window failed.
    MmapFailed(io::Error),
}

impl fmt::Display for BarMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DevMemOpen(e) => write!(f, "failed to open /dev/mem: {}", e),
            Self::MmapFailed(e) => write!(f, "BAR mmap failed: {}", e),
        }
    }
}

impl std::error::Error for BarMapError {}

/// Failure during device discovery / identification.
#[derive(Debug)]
pub enum DeviceError {
    /// environment: sysfs walk failed outright.
    SysfsWalk(io::Error),
    /// environment: no `xdma_uio`-named UIO device found.
    NoDevice,
    /// input: a requested UIO index does not exist.
    UioIndexNotFound(u32),
    /// environment: a sysfs map attribute (addr/offset/size) was missing or unreadable.
    MissingMapAttribute { map: u32, attribute: &'static str },
    /// input: a `map<M>` entry names M >= PCIE_MAX_BARS.
    InvalidMapIndex(u32),
    /// resource: mapping a discovered BAR failed.
    BarMap(BarMapError),
    /// identification: two BARs are both 64 KiB; the heuristic can't disambiguate.
    CannotDistinguishControlBar,
    /// identification: the single 64 KiB candidate's config identifier did not match.
    ConfigIdentifierMismatch,
    /// identification: no BAR among the populated set is a plausible control BAR.
    ControlBarNotIdentified,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SysfsWalk(e) => write!(f, "failed to enumerate /sys/class/uio: {}", e),
            Self::NoDevice => write!(f, "no device"),
            Self::UioIndexNotFound(n) => write!(f, "uio{} not found among xdma_uio devices", n),
            Self::MissingMapAttribute { map, attribute } => {
                write!(f, "map{} is missing attribute '{}'", map, attribute)
            }
            Self::InvalidMapIndex(m) => write!(f, "invalid map index {} (max is 5)", m),
            Self::BarMap(e) => write!(f, "{}", e),
            Self::CannotDistinguishControlBar => write!(f, "cannot distinguish control BAR"),
            Self::ConfigIdentifierMismatch => write!(f, "config identifier mismatched"),
            Self::ControlBarNotIdentified => write!(f, "failed to identify control BAR"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<BarMapError> for DeviceError {
    fn from(e: BarMapError) -> Self {
        Self::BarMap(e)
    }
}

/// Failure initializing a transfer buffer.
#[derive(Debug)]
pub enum BufferError {
    /// input: requested transfer size exceeds the backing data page(s).
    SizeOutOfRange { requested: u64, max: u64 },
    /// input: requested size is zero.
    ZeroSize,
    /// resource: a backing huge page could not be allocated.
    HugePage(HugePageError),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeOutOfRange { requested, max } => write!(
                f,
                "request size out of range: {} bytes exceeds max of {} bytes",
                requested, max
            ),
            Self::ZeroSize => write!(f, "request size out of range: size must be non-zero"),
            Self::HugePage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BufferError {}

impl From<HugePageError> for BufferError {
    fn from(e: HugePageError) -> Self {
        Self::HugePage(e)
    }
}
