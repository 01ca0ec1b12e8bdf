//! Live capture from a Fusion-class device receive ring.
//!
//! Each port's receive path is a shared-memory ring of fixed-size
//! chunks. A chunk carries up to 120 payload bytes plus an info word
//! holding a generation counter, a length (non-zero only on the final
//! chunk of a frame) and the device tick timestamp. Frames are
//! reassembled by walking chunks until a final chunk shows up; if the
//! producer laps us the generation counter jumps and the frame is
//! reported as lost.

use std::fs::File;
use std::io;
use std::mem;
use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, SourceError};
use crate::pcap::LINKTYPE_ETHERNET;
use crate::source::{RawRecord, ReadOptions, ReadStatus};
use crate::time::{PsTime, NANOS_PER_SEC};

/// Payload bytes carried by one ring chunk.
const CHUNK_PAYLOAD: usize = 120;
/// Chunk stride in the mapped region: payload plus the info word.
const CHUNK_STRIDE: usize = 128;
/// Chunks per port ring.
const RING_CHUNKS: usize = 4096;
/// Mapped bytes per port ring.
const RING_BYTES: usize = RING_CHUNKS * CHUNK_STRIDE;
/// Offset of port 0's receive ring within the device region.
const RX_REGION_OFFSET: u64 = 0x20_0000;
/// Free-running device tick rate in Hz.
const TICK_HZ: u64 = 350_000_000;

/// Decoded chunk info word (device-native layout).
#[derive(Debug, Clone, Copy)]
struct ChunkInfo {
    generation: u8,
    /// Payload bytes in this chunk; zero means more chunks follow.
    length: u8,
    /// Device tick counter, valid on the final chunk of a frame.
    timestamp: u32,
}

impl ChunkInfo {
    fn from_word(word: u64) -> Self {
        let b = word.to_le_bytes();
        Self {
            generation: b[0],
            length: b[1],
            timestamp: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }
}

/// Live reader over one port's receive ring.
pub struct NicReader {
    map: Mmap,
    next_chunk: usize,
    generation: u8,
    _promisc: Option<PromiscGuard>,
}

impl NicReader {
    /// Acquire a device port by name (`ifname` or `dev:port`).
    pub fn open(options: &ReadOptions) -> Result<Self, Error> {
        let (device, port) = parse_device_port(&options.source);
        let path = format!("/dev/{device}");
        let file = File::open(&path).map_err(|e| {
            Error::Source(SourceError::Interface {
                name: options.source.clone(),
                reason: e.to_string(),
            })
        })?;

        let offset = RX_REGION_OFFSET + port as u64 * RING_BYTES as u64;
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(RING_BYTES)
                .map(&file)
        }
        .map_err(|e| {
            Error::Source(SourceError::Interface {
                name: options.source.clone(),
                reason: format!("could not map receive ring: {e}"),
            })
        })?;

        // Best effort; capture still works without promiscuous mode.
        let promisc = if options.promiscuous {
            match PromiscGuard::enable(&device) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    tracing::warn!("could not change to promiscuous mode: {e}");
                    None
                }
            }
        } else {
            None
        };

        let mut reader = Self {
            map,
            next_chunk: 0,
            generation: 0,
            _promisc: promisc,
        };
        reader.catch_up();
        Ok(reader)
    }

    /// Pull the next frame into `buffer`.
    pub fn next(&mut self, buffer: &mut [u8]) -> RawRecord {
        let mut info = self.chunk_info(self.next_chunk);

        if info.generation == self.generation.wrapping_sub(1) {
            return RawRecord::status_only(ReadStatus::Again);
        }
        if info.generation != self.generation {
            self.catch_up();
            return RawRecord::status_only(ReadStatus::Overflow);
        }

        // Next expected frame: concatenate chunks until the final one.
        let mut size = 0usize;
        loop {
            let chunk = self.next_chunk;
            self.advance();

            let last = info.length != 0;
            let payload_len = if last {
                info.length as usize
            } else {
                CHUNK_PAYLOAD
            };
            let fit = payload_len.min(buffer.len().saturating_sub(size));
            if fit > 0 {
                self.copy_payload(chunk, &mut buffer[size..size + fit]);
            }
            size += payload_len;

            if last {
                let captured = size.min(buffer.len()) as u32;
                // The ring does not carry the wire length; captured+1
                // marks the record truncated so it is rejected
                // downstream.
                let len_orig = if size > buffer.len() {
                    captured + 1
                } else {
                    captured
                };
                return RawRecord {
                    status: ReadStatus::Ok,
                    link_type: LINKTYPE_ETHERNET,
                    len_capture: captured,
                    len_orig,
                    clock_time: self.tick_to_wall(info.timestamp),
                    is_real_time: true,
                };
            }

            // Spin until the producer publishes the next chunk.
            loop {
                info = self.chunk_info(self.next_chunk);
                if info.generation != self.generation.wrapping_sub(1) {
                    break;
                }
                std::hint::spin_loop();
            }
            if info.generation != self.generation {
                self.catch_up();
                return RawRecord::status_only(ReadStatus::Overflow);
            }
        }
    }

    fn chunk_info(&self, chunk: usize) -> ChunkInfo {
        let word = unsafe {
            let ptr = self.map.as_ptr().add(chunk * CHUNK_STRIDE + CHUNK_PAYLOAD);
            ptr::read_volatile(ptr as *const u64)
        };
        ChunkInfo::from_word(word)
    }

    fn copy_payload(&self, chunk: usize, dst: &mut [u8]) {
        unsafe {
            let src = self.map.as_ptr().add(chunk * CHUNK_STRIDE);
            ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len());
        }
    }

    fn advance(&mut self) {
        self.next_chunk += 1;
        if self.next_chunk == RING_CHUNKS {
            self.next_chunk = 0;
            self.generation = self.generation.wrapping_add(1);
        }
    }

    /// Resynchronize with the producer after a lap.
    fn catch_up(&mut self) {
        self.next_chunk = 0;
        self.generation = self.chunk_info(0).generation;
    }

    /// Extend the 32-bit device tick to a wall-clock nanosecond time
    /// using the host clock to pick the nearest 2^32 window.
    fn tick_to_wall(&self, tick: u32) -> PsTime {
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let now_ticks = (now_ns as u128 * TICK_HZ as u128 / NANOS_PER_SEC as u128) as u64;

        let mut ticks = (now_ticks & !0xFFFF_FFFF) | u64::from(tick);
        if ticks > now_ticks && ticks - now_ticks > 0x8000_0000 && ticks >= 1 << 32 {
            ticks -= 1 << 32;
        } else if now_ticks > ticks && now_ticks - ticks > 0x8000_0000 {
            ticks += 1 << 32;
        }

        let nanos = (ticks as u128 * NANOS_PER_SEC as u128 / TICK_HZ as u128) as u64;
        PsTime::from_nanos(nanos)
    }
}

/// Split `dev:port` into its parts; a bare name is port 0.
fn parse_device_port(name: &str) -> (String, u32) {
    match name.rsplit_once(':') {
        Some((device, port)) => match port.parse() {
            Ok(port) => (device.to_string(), port),
            Err(_) => (name.to_string(), 0),
        },
        None => (name.to_string(), 0),
    }
}

/// Puts an interface into promiscuous mode and restores it on drop,
/// including the early-exit paths of reader construction.
struct PromiscGuard {
    ifname: String,
}

impl PromiscGuard {
    fn enable(ifname: &str) -> io::Result<Self> {
        set_promiscuous(ifname, true)?;
        Ok(Self {
            ifname: ifname.to_string(),
        })
    }
}

impl Drop for PromiscGuard {
    fn drop(&mut self) {
        if let Err(e) = set_promiscuous(&self.ifname, false) {
            tracing::warn!("could not restore promiscuous mode on {}: {e}", self.ifname);
        }
    }
}

fn set_promiscuous(ifname: &str, enable: bool) -> io::Result<()> {
    let name = ifname.as_bytes();
    if name.is_empty() || name.len() >= libc::IFNAMSIZ {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "bad interface name",
        ));
    }

    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name) {
        *dst = *src as libc::c_char;
    }

    let result = unsafe {
        if libc::ioctl(fd, libc::SIOCGIFFLAGS, &mut ifr) == -1 {
            Err(io::Error::last_os_error())
        } else {
            if enable {
                ifr.ifr_ifru.ifru_flags |= libc::IFF_PROMISC as libc::c_short;
            } else {
                ifr.ifr_ifru.ifru_flags &= !(libc::IFF_PROMISC as libc::c_short);
            }
            if libc::ioctl(fd, libc::SIOCSIFFLAGS, &mut ifr) == -1 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    };
    unsafe { libc::close(fd) };
    result
}
