//! Device discovery: sysfs walk, BAR enumeration, control-BAR identification.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::barmap::BarMap;
use crate::error::{BarMapError, DeviceError};
use crate::regfile::RegFile;

pub const PCIE_MAX_BARS: usize = 6;

const XDMA_UIO_NAME: &str = "xdma_uio";
const XDMA_REGISTER_LEN: usize = 65536;
const XDMA_CONFIG_IDENTIFIER_MASKED: u32 = 0x1FC3_0000;

/// A discovered and fully identified XDMA device: a populated set of BAR
/// mappings plus which one holds the control register file.
pub struct Device {
    uio_index: u32,
    num_bars: i32,
    control_bar_index: i32,
    bars: [Option<BarMap>; PCIE_MAX_BARS],
}

impl Device {
    pub fn uio_index(&self) -> u32 {
        self.uio_index
    }

    pub fn num_bars(&self) -> i32 {
        self.num_bars
    }

    pub fn control_bar_index(&self) -> i32 {
        self.control_bar_index
    }

    /// Virtual base address of `bar_index`, or `None` if unpopulated or out
    /// of range. Rejects `bar_index >= PCIE_MAX_BARS` (the original driver's
    /// off-by-one accepted `== PCIE_MAX_BARS`).
    pub fn bar_vaddr(&self, bar_index: usize) -> Option<*mut u8> {
        if bar_index >= PCIE_MAX_BARS {
            return None;
        }
        self.bars[bar_index].as_ref().map(|b| b.vaddr())
    }

    pub fn bar_len(&self, bar_index: usize) -> usize {
        if bar_index >= PCIE_MAX_BARS {
            return 0;
        }
        self.bars[bar_index].as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// A `RegFile` view over the control BAR, or `None` if no control BAR
    /// was identified (never the case for a successfully constructed
    /// `Device` — the factory is all-or-nothing).
    pub fn regs(&self) -> Option<RegFile<'_>> {
        let bar = self.bars.get(self.control_bar_index as usize)?.as_ref()?;
        Some(RegFile::new(bar))
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "XDMA:")?;
        writeln!(f, "uio: uio{}", self.uio_index)?;
        writeln!(f, "# of BARs: {}", self.num_bars)?;
        write!(f, "XDMA BAR index: {}", self.control_bar_index)
    }
}

/// One `map<M>` entry read out of sysfs.
struct MapEntry {
    map_id: u32,
    addr: u64,
    size: usize,
}

/// Discovers and opens `xdma_uio` devices.
pub struct DeviceFactory;

impl DeviceFactory {
    /// Open the device at `uio_index`, or the first discovered `xdma_uio`
    /// device if `uio_index` is `None`.
    pub fn open(uio_index: Option<u32>) -> Result<Device, DeviceError> {
        Self::open_with_root(Path::new("/sys/class/uio"), uio_index)
    }

    /// Same as `open`, but rooted at an arbitrary sysfs-shaped directory.
    /// Exposed so the discovery algorithm can be exercised against a
    /// temp-directory stub in tests, without root or real hardware.
    pub fn open_with_root(sysfs_root: &Path, uio_index: Option<u32>) -> Result<Device, DeviceError> {
        let candidates = enumerate_xdma_uio(sysfs_root)?;
        if candidates.is_empty() {
            return Err(DeviceError::NoDevice);
        }

        let target_index = match uio_index {
            Some(want) => {
                if !candidates.iter().any(|(_, n)| *n == want) {
                    return Err(DeviceError::UioIndexNotFound(want));
                }
                want
            }
            None => candidates[0].1,
        };
        let target_dir = candidates
            .iter()
            .find(|(_, n)| *n == target_index)
            .map(|(p, _)| p.clone())
            .expect("target_index was just confirmed present");

        let maps = enumerate_maps(&target_dir)?;
        let (bars, num_bars) = map_bars_with(&maps, |addr, len| BarMap::map(addr, len))?;
        let control_bar_index = identify_control_bar(&bars, num_bars)?;

        info!(
            "opened uio{}: {} BAR(s), control BAR index {}",
            target_index, num_bars, control_bar_index
        );

        Ok(Device {
            uio_index: target_index,
            num_bars,
            control_bar_index,
            bars,
        })
    }
}

/// Map every enumerated entry via `mapper`, installing each at its `map_id`
/// slot. Factored out from `open_with_root` so discovery can be tested
/// against an in-memory stub instead of real `/dev/mem`.
fn map_bars_with<F>(
    maps: &[MapEntry],
    mapper: F,
) -> Result<([Option<BarMap>; PCIE_MAX_BARS], i32), DeviceError>
where
    F: Fn(u64, usize) -> Result<BarMap, BarMapError>,
{
    let mut bars: [Option<BarMap>; PCIE_MAX_BARS] = Default::default();
    let mut num_bars = 0i32;
    for entry in maps {
        let bar = mapper(entry.addr, entry.size)?;
        bars[entry.map_id as usize] = Some(bar);
        num_bars += 1;
    }
    Ok((bars, num_bars))
}

/// Walk `sysfs_root` for `uio<N>` children whose `name` file reads exactly
/// `xdma_uio`. Returns (directory, N) pairs.
fn enumerate_xdma_uio(sysfs_root: &Path) -> Result<Vec<(PathBuf, u32)>, DeviceError> {
    let mut found = Vec::new();

    let entries = fs::read_dir(sysfs_root).map_err(DeviceError::SysfsWalk)?;
    for entry in entries {
        let entry = entry.map_err(DeviceError::SysfsWalk)?;
        let path = entry.path();

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let n = match file_name.strip_prefix("uio").and_then(|s| s.parse::<u32>().ok()) {
            Some(n) => n,
            None => continue,
        };

        let name_path = path.join("name");
        let name = match fs::read_to_string(&name_path) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if name.trim() != XDMA_UIO_NAME {
            continue;
        }

        found.push((path, n));
    }

    found.sort_by_key(|(_, n)| *n);
    Ok(found)
}

/// Enumerate `<uio_dir>/maps/map<M>` entries, following a symlinked `maps`
/// directory if present.
fn enumerate_maps(uio_dir: &Path) -> Result<Vec<MapEntry>, DeviceError> {
    let maps_dir = uio_dir.join("maps");
    let maps_dir = if maps_dir.is_symlink() {
        fs::read_link(&maps_dir).map_err(DeviceError::SysfsWalk)?
    } else {
        maps_dir
    };

    let mut out = Vec::new();
    let entries = fs::read_dir(&maps_dir).map_err(DeviceError::SysfsWalk)?;
    for entry in entries {
        let entry = entry.map_err(DeviceError::SysfsWalk)?;
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let map_id = match file_name.strip_prefix("map").and_then(|s| s.parse::<u32>().ok()) {
            Some(n) => n,
            None => continue,
        };
        if map_id as usize >= PCIE_MAX_BARS {
            return Err(DeviceError::InvalidMapIndex(map_id));
        }

        let addr = read_c_style_int(&path, map_id, "addr")?;
        let _offset = read_c_style_int(&path, map_id, "offset")?;
        let size = read_c_style_int(&path, map_id, "size")?;

        out.push(MapEntry {
            map_id,
            addr,
            size: size as usize,
        });
    }

    out.sort_by_key(|m| m.map_id);
    Ok(out)
}

/// Read a C-style integer string (accepting a `0x`-prefixed hex literal or
/// plain decimal) from `<map_dir>/<attribute>`.
fn read_c_style_int(map_dir: &Path, map_id: u32, attribute: &'static str) -> Result<u64, DeviceError> {
    let path = map_dir.join(attribute);
    let missing = || DeviceError::MissingMapAttribute { map: map_id, attribute };

    let raw = fs::read_to_string(&path).map_err(|_| missing())?;
    let trimmed = raw.trim();

    let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<u64>()
    };

    parsed.map_err(|_| missing())
}

/// Identify which populated BAR holds the control register file, per the
/// count-of-populated-BARs heuristic. Reproduces the original driver's
/// two-BAR dead branch faithfully: two 64 KiB BARs is unconditionally a
/// "cannot distinguish" failure.
fn identify_control_bar(
    bars: &[Option<BarMap>; PCIE_MAX_BARS],
    num_bars: i32,
) -> Result<i32, DeviceError> {
    match num_bars {
        1 => Ok(0),
        3 => Ok(1),
        2 => {
            let bar0 = bars[0].as_ref().expect("num_bars == 2 implies bar0 present");
            let bar1 = bars[1].as_ref().expect("num_bars == 2 implies bar1 present");

            let bar0_len = bar0.len();
            let bar1_len = bar1.len();

            if bar0_len == bar1_len {
                if bar0_len == XDMA_REGISTER_LEN {
                    return Err(DeviceError::CannotDistinguishControlBar);
                }
                return Err(DeviceError::ControlBarNotIdentified);
            }

            let bar0_config = bar0.read32(0x3000) & 0xFFFF_0000;
            let bar1_config = bar1.read32(0x3000) & 0xFFFF_0000;

            if bar0_len == XDMA_REGISTER_LEN {
                if bar0_config == XDMA_CONFIG_IDENTIFIER_MASKED {
                    Ok(0)
                } else {
                    Err(DeviceError::ConfigIdentifierMismatch)
                }
            } else if bar1_len == XDMA_REGISTER_LEN {
                if bar1_config == XDMA_CONFIG_IDENTIFIER_MASKED {
                    Ok(1)
                } else {
                    Err(DeviceError::ConfigIdentifierMismatch)
                }
            } else {
                Err(DeviceError::ControlBarNotIdentified)
            }
        }
        _ => Err(DeviceError::ControlBarNotIdentified),
    }
}

/// Same walk as `DeviceFactory::open_with_root`, but backs every BAR with
/// an anonymous-memory stub instead of `/dev/mem` — exercises the sysfs
/// walk and identification heuristic without root or real hardware.
#[cfg(test)]
fn open_with_stub_bars(sysfs_root: &Path, uio_index: Option<u32>) -> Result<Device, DeviceError> {
    let candidates = enumerate_xdma_uio(sysfs_root)?;
    if candidates.is_empty() {
        return Err(DeviceError::NoDevice);
    }
    let target_index = match uio_index {
        Some(want) => {
            if !candidates.iter().any(|(_, n)| *n == want) {
                return Err(DeviceError::UioIndexNotFound(want));
            }
            want
        }
        None => candidates[0].1,
    };
    let target_dir = candidates
        .iter()
        .find(|(_, n)| *n == target_index)
        .map(|(p, _)| p.clone())
        .expect("target_index was just confirmed present");

    let maps = enumerate_maps(&target_dir)?;
    let (bars, num_bars) = map_bars_with(&maps, |_addr, len| Ok(BarMap::stub(len)))?;
    let control_bar_index = identify_control_bar(&bars, num_bars)?;

    Ok(Device {
        uio_index: target_index,
        num_bars,
        control_bar_index,
        bars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_map(dir: &Path, map_id: u32, addr: u64, offset: u64, size: u64) {
        let map_dir = dir.join(format!("map{}", map_id));
        fs::create_dir_all(&map_dir).unwrap();
        fs::write(map_dir.join("addr"), format!("{:#x}", addr)).unwrap();
        fs::write(map_dir.join("offset"), format!("{:#x}", offset)).unwrap();
        fs::write(map_dir.join("size"), format!("{}", size)).unwrap();
    }

    fn write_uio(root: &Path, n: u32, name: &str) -> PathBuf {
        let dir = root.join(format!("uio{}", n));
        fs::create_dir_all(dir.join("maps")).unwrap();
        let mut f = fs::File::create(dir.join("name")).unwrap();
        writeln!(f, "{}", name).unwrap();
        dir
    }

    #[test]
    fn single_bar_discovery_picks_control_bar_zero() {
        let tmp = tempdir();
        let dir = write_uio(&tmp, 0, "xdma_uio");
        write_map(&dir.join("maps"), 0, 0x8000_0000, 0, 65536);

        let device = open_with_stub_bars(&tmp, None).unwrap();
        assert_eq!(device.num_bars(), 1);
        assert_eq!(device.control_bar_index(), 0);
        assert_eq!(device.bar_len(0), 65536);
    }

    #[test]
    fn three_bar_discovery_picks_control_bar_one() {
        let tmp = tempdir();
        let dir = write_uio(&tmp, 0, "xdma_uio");
        write_map(&dir.join("maps"), 0, 0x8000_0000, 0, 16384);
        write_map(&dir.join("maps"), 1, 0x8001_0000, 0, 65536);
        write_map(&dir.join("maps"), 2, 0x8002_0000, 0, 1_048_576);

        let device = open_with_stub_bars(&tmp, None).unwrap();
        assert_eq!(device.control_bar_index(), 1);
    }

    #[test]
    fn two_bar_ambiguous_when_both_are_register_length() {
        let tmp = tempdir();
        let dir = write_uio(&tmp, 0, "xdma_uio");
        write_map(&dir.join("maps"), 0, 0x8000_0000, 0, 65536);
        write_map(&dir.join("maps"), 1, 0x8001_0000, 0, 65536);

        let err = open_with_stub_bars(&tmp, None).unwrap_err();
        assert!(matches!(err, DeviceError::CannotDistinguishControlBar));
    }

    #[test]
    fn two_bar_unambiguous_identifies_control_bar_by_config_identifier() {
        let mut bars: [Option<BarMap>; PCIE_MAX_BARS] = Default::default();
        bars[0] = Some(BarMap::stub(8192));
        bars[1] = Some(BarMap::stub(XDMA_REGISTER_LEN));
        bars[1].as_ref().unwrap().write32(0x3000, 0x1FC3_ABCD);

        let control = identify_control_bar(&bars, 2).unwrap();
        assert_eq!(control, 1);
    }

    #[test]
    fn two_bar_config_identifier_mismatch_fails() {
        let mut bars: [Option<BarMap>; PCIE_MAX_BARS] = Default::default();
        bars[0] = Some(BarMap::stub(8192));
        bars[1] = Some(BarMap::stub(XDMA_REGISTER_LEN));
        bars[1].as_ref().unwrap().write32(0x3000, 0x11C3_ABCD);

        let err = identify_control_bar(&bars, 2).unwrap_err();
        assert!(matches!(err, DeviceError::ConfigIdentifierMismatch));
    }

    #[test]
    fn ignores_non_xdma_uio_devices() {
        let tmp = tempdir();
        write_uio(&tmp, 0, "other_uio");
        let err = open_with_stub_bars(&tmp, None).unwrap_err();
        assert!(matches!(err, DeviceError::NoDevice));
    }

    /// Minimal scratch-directory helper; avoids pulling in a `tempfile` dev
    /// dependency for one test module.
    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let unique = format!(
            "xdma-udrv-test-{}-{:?}",
            std::process::id(),
            std::time::Instant::now()
        );
        dir.push(unique);
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
