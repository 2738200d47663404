//! Minimal C2H transfer tool: arms one channel, waits for completion, and
//! writes the received bytes to disk. One invocation per `--size` value;
//! each produces its own output file.
//!
//! This binary is a thin consumer of the library's public API — it does
//! not reimplement hexdump or any data-verification routine.

use std::fs::File;
use std::io::Write as _;
use std::time::Instant;

use log::{info, warn};

use xdma_udrv::{DeviceFactory, RegFile, ScatterBuffer, ScatterBufferConfig, Target};

struct Args {
    sizes: Vec<u64>,
    fname: String,
}

fn parse_args() -> Args {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let mut sizes = Vec::new();
    let mut fname = String::from("dump.bin");

    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--size" | "-s" => {
                i += 1;
                while i < raw.len() && !raw[i].starts_with("--") {
                    match parse_size(&raw[i]) {
                        Some(n) => sizes.push(n),
                        None => {
                            eprintln!("invalid --size value: {}", raw[i]);
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                }
                continue;
            }
            "--fname" | "-f" => {
                if let Some(v) = raw.get(i + 1) {
                    fname = v.clone();
                }
                i += 2;
                continue;
            }
            _ => {
                i += 1;
            }
        }
    }

    if sizes.is_empty() {
        eprintln!("please specify at least one --size");
        std::process::exit(1);
    }

    Args { sizes, fname }
}

fn parse_size(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

/// Insert an index before the last `.` of `fname`, or append it if there is
/// no extension: `dump.bin` -> `dump.0.bin`.
fn indexed_name(fname: &str, index: usize) -> String {
    match fname.rfind('.') {
        Some(pos) => format!("{}.{}{}", &fname[..pos], index, &fname[pos..]),
        None => format!("{}.{}", fname, index),
    }
}

fn poll_until_complete(regs: &RegFile<'_>) -> u32 {
    loop {
        let status = regs.read_at(Target::C2hChannel, 0, 0x40);
        if status == 0xFFFF_FFFF {
            // transient; device not yet driving the bus
            continue;
        }
        if status & (1 << 2) != 0 {
            return status;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args();

    let device = match DeviceFactory::open(None) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("failed to open device: {}", e);
            std::process::exit(1);
        }
    };
    info!("{}", device);

    let regs = device.regs().expect("control BAR identified at open()");

    let total: u64 = args.sizes.iter().sum();
    let mut buffer = match ScatterBuffer::new(total, ScatterBufferConfig::default()) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("failed to allocate transfer buffer: {}", e);
            std::process::exit(1);
        }
    };
    buffer.initialize();

    // Arm C2H channel 0: completion IRQ-enable bit (unused without an IRQ
    // path, but mirrors the channel's expected configuration), then cycle
    // the run bit.
    regs.write_at(Target::C2hChannel, 0, 0x08, 1 << 2);
    regs.write_at(Target::C2hChannel, 0, 0x0C, 1);

    regs.write_at(
        Target::C2hSgdma,
        0,
        0x80,
        buffer.descriptor_ring_paddr() as u32,
    );
    regs.write_at(
        Target::C2hSgdma,
        0,
        0x84,
        (buffer.descriptor_ring_paddr() >> 32) as u32,
    );

    let start = Instant::now();
    regs.write_at(Target::C2hChannel, 0, 0x08, 1);
    let status = poll_until_complete(&regs);
    let elapsed = start.elapsed();
    info!("C2H channel 0 status: {:#010x}", status);

    // Clear descriptor_completed.
    regs.write_at(Target::C2hChannel, 0, 0x40, 1 << 2);

    let transferred = buffer.xfered_size();
    let throughput_mib_s = (transferred as f64 / elapsed.as_secs_f64()) / (1 << 20) as f64;
    info!(
        "transferred {} byte(s) in {:.3}s ({:.3} MiB/s)",
        transferred,
        elapsed.as_secs_f64(),
        throughput_mib_s
    );

    if transferred < total {
        warn!("requested {} bytes, received {}", total, transferred);
    }

    let mut chunk_idx = 0usize;
    for (i, &size) in args.sizes.iter().enumerate() {
        let chunks = xdma_udrv::descriptor::CHUNK;
        let n_chunks = ((size + chunks - 1) / chunks) as usize;
        let out_name = if args.sizes.len() == 1 {
            args.fname.clone()
        } else {
            indexed_name(&args.fname, i)
        };

        let mut file = match File::create(&out_name) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("open({}): {}", out_name, e);
                std::process::exit(1);
            }
        };

        for _ in 0..n_chunks {
            let page_index = chunk_idx / 8;
            let inner = chunk_idx % 8;
            let vaddr = match buffer.data_vaddr(page_index) {
                Some(v) => v,
                None => break,
            };
            let start = unsafe { vaddr.add(inner * chunks as usize) };
            let slice = unsafe { std::slice::from_raw_parts(start, chunks as usize) };
            if let Err(e) = file.write_all(slice) {
                eprintln!("write({}): {}", out_name, e);
                std::process::exit(1);
            }
            chunk_idx += 1;
        }
    }
}
