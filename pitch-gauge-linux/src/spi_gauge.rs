//! Analog gauge driver board over spidev.
//!
//! Each reading is sent as one 7-byte `GaugeFrame`. The board has no chip
//! select line, so the bus runs in `SPI_NO_CS` mode at 8 bits per word.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;

use parking_lot::Mutex;
use thiserror::Error;

use pitch_gauge_core::models::pitch::GaugeReading;
use pitch_gauge_core::output::gauge_frame::GaugeFrame;
use pitch_gauge_core::traits::gauge_output::GaugeOutput;

const SPI_IOC_MAGIC: u32 = b'k' as u32;
const SPI_NO_CS: u32 = 0x40;

// asm-generic ioctl encoding: dir << 30 | size << 16 | type << 8 | nr
const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | (SPI_IOC_MAGIC << 8) | nr
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const SPI_IOC_WR_BITS_PER_WORD: u32 = ioc(IOC_WRITE, 3, 1);
const SPI_IOC_RD_MAX_SPEED_HZ: u32 = ioc(IOC_READ, 4, 4);
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = ioc(IOC_WRITE, 4, 4);
const SPI_IOC_WR_MODE32: u32 = ioc(IOC_WRITE, 5, 4);

/// Errors from opening and configuring the SPI device.
#[derive(Debug, Error)]
pub enum SpiError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed: {source}")]
    Ioctl {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Gauge output driving the needle board through `/dev/spidevB.C`.
pub struct SpiGauge {
    file: Mutex<File>,
    path: String,
    speed_hz: u32,
}

impl SpiGauge {
    pub const DEFAULT_DEVICE: &'static str = "/dev/spidev0.0";
    pub const TARGET_SPEED_HZ: u32 = 1_000_000;

    /// Open and configure the bus.
    ///
    /// A bus that refuses the target clock keeps its current one.
    pub fn open(path: &str) -> Result<Self, SpiError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| SpiError::Open {
                path: path.to_string(),
                source,
            })?;
        let fd = file.as_raw_fd();

        let mut mode = SPI_NO_CS;
        ioctl(fd, SPI_IOC_WR_MODE32, &mut mode, "set SPI mode")?;

        let mut word_bits: u8 = 8;
        ioctl(fd, SPI_IOC_WR_BITS_PER_WORD, &mut word_bits, "set SPI word bits")?;

        let mut bus_speed: u32 = 0;
        ioctl(fd, SPI_IOC_RD_MAX_SPEED_HZ, &mut bus_speed, "get SPI max speed")?;

        let mut speed_hz = Self::TARGET_SPEED_HZ;
        log::info!(
            "{}: SPI speed {} Hz, changing to {} Hz",
            path,
            bus_speed,
            speed_hz
        );
        if let Err(e) = ioctl(fd, SPI_IOC_WR_MAX_SPEED_HZ, &mut speed_hz, "set SPI max speed") {
            log::warn!("{}; keeping {} Hz", e, bus_speed);
            speed_hz = bus_speed;
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_string(),
            speed_hz,
        })
    }

    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }
}

impl GaugeOutput for SpiGauge {
    fn show(&self, reading: &GaugeReading) {
        let frame = GaugeFrame::encode(reading);
        if let Err(e) = self.file.lock().write_all(frame.as_bytes()) {
            log::warn!("failed to send gauge frame to {}: {}", self.path, e);
        }
    }
}

impl Drop for SpiGauge {
    fn drop(&mut self) {
        log::debug!("gauges released ({})", self.path);
    }
}

fn ioctl<T>(fd: i32, request: u32, value: &mut T, op: &'static str) -> Result<(), SpiError> {
    // SAFETY: every request used here encodes size_of::<T>() and `value`
    // outlives the call.
    let rc = unsafe { libc::ioctl(fd, request as _, value as *mut T) };
    if rc == -1 {
        return Err(SpiError::Ioctl {
            op,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}
