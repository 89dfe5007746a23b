//! ALSA capture device with zero-copy mmap access.
//!
//! Opens a hardware PCM for single-channel S16_LE capture in
//! `MMapInterleaved` mode and exposes it through `PcmDevice`. Recovery
//! policy lives in `CaptureEngine`; this module only translates driver
//! calls and error codes.

use alsa::pcm::{Access, Format, Frames, HwParams, State, PCM};
use alsa::{Direction, ValueOr};

use pitch_gauge_core::models::config::{CaptureParams, RatePolicy, TunerConfiguration};
use pitch_gauge_core::models::error::{CaptureError, DeviceError};
use pitch_gauge_core::models::state::DeviceState;
use pitch_gauge_core::traits::pcm_device::{MappedArea, PcmDevice};

/// Mono S16_LE capture stream on an ALSA hardware device.
pub struct AlsaCapture {
    pcm: PCM,
    name: String,
}

impl AlsaCapture {
    /// Open `device`, negotiate the stream, and start it.
    ///
    /// Every failure here is fatal: the hardware cannot provide what the
    /// tuner needs.
    pub fn open(
        device: &str,
        config: &TunerConfiguration,
    ) -> Result<(Self, CaptureParams), CaptureError> {
        let pcm = PCM::new(device, Direction::Capture, false)
            .map_err(|e| CaptureError::DeviceNotAvailable(format!("{}: {}", device, e)))?;

        let params = negotiate(&pcm, config)?;
        log::info!(
            "opened {}: {} Hz, period {} frames, buffer {} frames, timeout {} us",
            device,
            params.sample_rate_hz,
            params.period_frames,
            params.buffer_frames,
            params.timeout_micros
        );

        pcm.prepare().map_err(|e| setup_failed("prepare", &e))?;
        pcm.start().map_err(|e| setup_failed("start", &e))?;

        Ok((
            Self {
                pcm,
                name: device.to_string(),
            },
            params,
        ))
    }
}

impl Drop for AlsaCapture {
    fn drop(&mut self) {
        if let Err(e) = self.pcm.drop() {
            log::warn!("failed to stop {}: {}", self.name, e);
        }
        log::debug!("closed capture device {}", self.name);
    }
}

impl PcmDevice for AlsaCapture {
    fn state(&self) -> DeviceState {
        map_state(self.pcm.state())
    }

    fn avail(&mut self) -> Result<usize, DeviceError> {
        let frames = self
            .pcm
            .avail_update()
            .map_err(|e| device_error(&e, "avail_update"))?;
        Ok(frames.max(0) as usize)
    }

    fn wait(&mut self, timeout_ms: u32) -> Result<bool, DeviceError> {
        self.pcm
            .wait(Some(timeout_ms))
            .map_err(|e| device_error(&e, "wait"))
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.pcm.start().map_err(|e| device_error(&e, "start"))
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.pcm.prepare().map_err(|e| device_error(&e, "prepare"))
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.pcm.resume().map_err(|e| device_error(&e, "resume"))
    }

    fn read_mapped(
        &mut self,
        frames: usize,
        consume: &mut dyn FnMut(MappedArea<'_>) -> usize,
    ) -> Result<usize, DeviceError> {
        let io = self.pcm.io_i16().map_err(|e| device_error(&e, "io"))?;
        // The mmap wrapper rejects any area that is not one plain
        // interleaved buffer (reported as ENOTSUP), so what reaches the
        // closure is always the contiguous layout.
        io.mmap(frames, |buf: &mut [i16]| {
            consume(MappedArea {
                samples: buf,
                first_bit: 0,
                step_bits: i16::BITS,
            })
        })
        .map_err(|e| device_error(&e, "mmap"))
    }
}

/// Hardware parameters shared by the rate probe and the final setup.
fn base_params<'a>(pcm: &'a PCM) -> Result<HwParams<'a>, CaptureError> {
    let hwp = HwParams::any(pcm).map_err(|e| setup_failed("hw_params_any", &e))?;
    hwp.set_access(Access::MMapInterleaved)
        .map_err(|e| setup_failed("set_access", &e))?;
    hwp.set_format(Format::S16LE)
        .map_err(|e| setup_failed("set_format", &e))?;
    hwp.set_channels(1)
        .map_err(|e| setup_failed("set_channels", &e))?;
    hwp.set_rate_resample(false)
        .map_err(|e| setup_failed("set_rate_resample", &e))?;
    Ok(hwp)
}

fn negotiate(pcm: &PCM, config: &TunerConfiguration) -> Result<CaptureParams, CaptureError> {
    let floor = config.min_sample_rate_hz();

    let rate = {
        let probe = base_params(pcm)?;
        let rate_min = probe.get_rate_min().map_err(|e| setup_failed("get_rate_min", &e))?;
        let rate_max = probe.get_rate_max().map_err(|e| setup_failed("get_rate_max", &e))?;
        log::debug!("hardware rates {}..={} Hz, need at least {} Hz", rate_min, rate_max, floor);

        if rate_max < floor {
            return Err(CaptureError::ConfigurationFailed(format!(
                "highest rate {} Hz is below the {} Hz needed",
                rate_max, floor
            )));
        }
        match config.rate_policy {
            RatePolicy::Highest => rate_max,
            RatePolicy::Lowest => probe
                .set_rate_near(rate_min.max(floor), ValueOr::Greater)
                .map_err(|e| setup_failed("set_rate_near", &e))?,
        }
    };

    let hwp = base_params(pcm)?;
    if hwp.set_rate(rate, ValueOr::Nearest).is_err() {
        let actual = hwp.set_rate_near(rate, ValueOr::Nearest).unwrap_or(0);
        return Err(CaptureError::InexactRate {
            requested: rate,
            actual,
        });
    }

    let params = CaptureParams::derive(rate, config.f_min());
    hwp.set_period_size(params.period_frames as Frames, ValueOr::Nearest)
        .map_err(|e| setup_failed("set_period_size", &e))?;
    hwp.set_buffer_size(params.buffer_frames as Frames)
        .map_err(|e| setup_failed("set_buffer_size", &e))?;
    pcm.hw_params(&hwp).map_err(|e| setup_failed("hw_params", &e))?;

    Ok(params)
}

fn setup_failed(op: &str, err: &alsa::Error) -> CaptureError {
    CaptureError::ConfigurationFailed(format!("{}: {}", op, err))
}

fn device_error(err: &alsa::Error, op: &'static str) -> DeviceError {
    errno_to_device_error(err.errno() as i32, op)
}

fn errno_to_device_error(errno: i32, op: &'static str) -> DeviceError {
    match errno {
        libc::EPIPE => DeviceError::Overrun,
        libc::ESTRPIPE => DeviceError::Suspended,
        libc::EAGAIN => DeviceError::TryAgain,
        libc::ENODEV => DeviceError::Disconnected,
        libc::ENOTSUP => DeviceError::Layout,
        errno => DeviceError::Io { op, errno },
    }
}

#[allow(unreachable_patterns)]
fn map_state(state: State) -> DeviceState {
    match state {
        State::Open => DeviceState::Open,
        State::Setup => DeviceState::Setup,
        State::Prepared => DeviceState::Prepared,
        State::Running => DeviceState::Running,
        State::XRun => DeviceState::XRun,
        State::Suspended => DeviceState::Suspended,
        State::Draining => DeviceState::Other("draining"),
        State::Paused => DeviceState::Other("paused"),
        State::Disconnected => DeviceState::Other("disconnected"),
        _ => DeviceState::Other("unknown"),
    }
}
