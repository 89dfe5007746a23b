use std::thread;
use std::time::Duration;

use crate::models::config::CaptureParams;
use crate::models::error::{CaptureError, DeviceError};
use crate::models::pitch::PeriodLevels;
use crate::models::state::{plan_for_error, plan_for_state, DeviceState, RecoveryAction};
use crate::processing::meter::PeriodMeter;
use crate::traits::pcm_device::{MappedArea, PcmDevice};

/// Fault-tolerant period delivery on top of a `PcmDevice`.
///
/// Overruns, suspends, stalls, and transient driver errors are recovered
/// here and never surface to the caller. The only errors `deliver_period`
/// returns are layout problems that no amount of retrying will fix.
///
/// ```text
/// deliver_period ─┬─ wait_for_period ── state check ── avail ── start / wait
///                 └─ read_mapped ── sink(&[i16]) ── commit
/// ```
pub struct CaptureEngine<D: PcmDevice> {
    device: D,
    params: CaptureParams,
    restart_pending: bool,
    last_state: Option<DeviceState>,
    levels: PeriodLevels,
    sleeper: fn(Duration),
}

impl<D: PcmDevice> CaptureEngine<D> {
    /// Wrap a device that has already been prepared and started.
    pub fn new(device: D, params: CaptureParams) -> Self {
        Self {
            device,
            params,
            restart_pending: false,
            last_state: None,
            levels: PeriodLevels::default(),
            sleeper: thread::sleep,
        }
    }

    /// Replace the back-off sleep (tests use a no-op).
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn params(&self) -> &CaptureParams {
        &self.params
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Whether the stream must be started again before it delivers data.
    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    /// Levels of the last delivered period.
    pub fn levels(&self) -> PeriodLevels {
        self.levels
    }

    /// One pass of the recovery state machine.
    ///
    /// Returns the available frame count once at least a period is ready,
    /// or 0 after a recovery step, a bounded wait, or a bounded sleep.
    /// Never blocks longer than about one timeout.
    pub fn wait_for_period(&mut self) -> usize {
        let state = self.device.state();
        if self.last_state != Some(state) {
            log::debug!("capture state: {}", state);
            if let DeviceState::Other(name) = state {
                log::warn!("unexpected capture state {}, continuing", name);
            }
            self.last_state = Some(state);
        }

        let (action, pending) = plan_for_state(state, self.restart_pending);
        self.restart_pending = pending;
        match action {
            RecoveryAction::Prepare => {
                log::warn!("capture overrun, preparing stream");
                if let Err(e) = self.device.prepare() {
                    log::warn!("prepare after overrun failed: {}", e);
                    self.back_off();
                    return 0;
                }
            }
            RecoveryAction::Resume => {
                if !self.resume() {
                    return 0;
                }
            }
            RecoveryAction::Sleep => {
                self.back_off();
                return 0;
            }
            RecoveryAction::Proceed | RecoveryAction::Report => {}
        }

        match self.device.avail() {
            Ok(frames) if frames >= self.params.period_frames => return frames,
            Ok(_) => {}
            Err(e) => {
                self.recover_from(e, "avail");
                return 0;
            }
        }

        if self.restart_pending {
            match self.device.start() {
                Ok(()) => {
                    log::debug!("capture stream restarted");
                    self.restart_pending = false;
                }
                Err(e) => {
                    log::warn!("capture start failed: {}", e);
                    self.back_off();
                }
            }
            return 0;
        }

        if let Err(e) = self.device.wait(self.params.timeout_ms()) {
            log::warn!("capture wait failed: {}", e);
            self.restart_pending = true;
            self.back_off();
        }
        0
    }

    /// Block until one full period has been handed to `sink`.
    ///
    /// `sink` sees exactly `period_frames` samples, borrowed straight from
    /// the hardware buffer. Returns the frames consumed: the period length,
    /// or 0 if the mapping came back short and the period was dropped.
    pub fn deliver_period<F>(&mut self, mut sink: F) -> Result<usize, CaptureError>
    where
        F: FnMut(&[i16]),
    {
        while self.wait_for_period() == 0 {}

        let period = self.params.period_frames;
        let mut layout = None;
        let mut levels = None;
        let mut mapped = false;

        let result = self.device.read_mapped(period, &mut |area: MappedArea<'_>| {
            mapped = true;
            if !area.is_contiguous() {
                layout = Some(format!(
                    "first bit {}, step {} bits",
                    area.first_bit, area.step_bits
                ));
                return 0;
            }
            if area.samples.len() < period {
                log::debug!(
                    "short mapping: {} of {} frames, dropping period",
                    area.samples.len(),
                    period
                );
                return 0;
            }
            let samples = &area.samples[..period];
            levels = Some(PeriodMeter::measure(samples));
            sink(samples);
            period
        });

        if let Some(detail) = layout {
            return Err(CaptureError::NonContiguousLayout(detail));
        }

        if let Some(levels) = levels {
            log::trace!(
                "period: peak {:.0} mean {:.1} mean|x| {:.1}",
                levels.peak,
                levels.mean,
                levels.mean_abs
            );
            self.levels = levels;
        }

        match result {
            Ok(consumed) => Ok(consumed),
            Err(DeviceError::Layout) => Err(CaptureError::NonContiguousLayout(
                "driver reported an unsupported area layout".into(),
            )),
            Err(e) if mapped => {
                log::warn!("mmap commit failed: {}", e);
                Ok(if levels.is_some() { period } else { 0 })
            }
            Err(e) => {
                self.recover_from(e, "mmap begin");
                Ok(0)
            }
        }
    }

    /// Retry resume until the device accepts it or fails hard.
    ///
    /// A hard failure sleeps once before returning so the caller's retry is
    /// bounded.
    fn resume(&mut self) -> bool {
        log::info!("capture stream suspended, resuming");
        loop {
            match self.device.resume() {
                Ok(()) => return true,
                Err(DeviceError::TryAgain) => self.back_off(),
                Err(e) => {
                    log::error!("resume failed: {}", e);
                    self.back_off();
                    return false;
                }
            }
        }
    }

    fn recover_from(&mut self, error: DeviceError, op: &str) {
        log::warn!("capture {} failed: {}", op, error);
        let (action, pending) = plan_for_error(error);
        self.restart_pending = pending;
        match action {
            RecoveryAction::Prepare => {
                if let Err(e) = self.device.prepare() {
                    log::warn!("prepare failed: {}", e);
                    self.back_off();
                }
            }
            RecoveryAction::Resume => {
                self.resume();
            }
            _ => self.back_off(),
        }
    }

    fn back_off(&self) {
        (self.sleeper)(Duration::from_micros(self.params.timeout_micros));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::session::fake_device::{FakeDevice, MapScript};

    const PERIOD: usize = 256;

    fn no_sleep(_: Duration) {}

    fn engine(device: FakeDevice) -> CaptureEngine<FakeDevice> {
        let params = CaptureParams::derive(8_000, 31.25);
        assert_eq!(params.period_frames, PERIOD);
        CaptureEngine::new(device, params).with_sleeper(no_sleep)
    }

    fn ramp(n: usize) -> i16 {
        (n % 1000) as i16 - 500
    }

    #[test]
    fn steady_stream_delivers_full_periods() {
        let mut engine = engine(FakeDevice::new(PERIOD).with_signal(ramp));
        let mut received = Vec::new();

        for _ in 0..3 {
            let n = engine.deliver_period(|s| received.extend_from_slice(s)).unwrap();
            assert_eq!(n, PERIOD);
        }

        assert_eq!(received.len(), 3 * PERIOD);
        assert!(received.iter().enumerate().all(|(n, s)| *s == ramp(n)));
        assert_eq!(engine.device().count("prepare"), 0);
        assert_eq!(engine.device().count("start"), 0);
    }

    #[test]
    fn xrun_prepares_then_restarts() {
        let mut device = FakeDevice::new(PERIOD).with_states([DeviceState::XRun]);
        device.avail.push_back(Ok(0));
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert!(!engine.restart_pending());
        assert_eq!(engine.device().calls, ["prepare", "avail", "start"]);

        let n = engine.deliver_period(|_| {}).unwrap();
        assert_eq!(n, PERIOD);
    }

    #[test]
    fn failed_prepare_retries_next_pass() {
        let mut device = FakeDevice::new(PERIOD).with_states([DeviceState::XRun]);
        device.prepare.push_back(Err(DeviceError::Io { op: "prepare", errno: 5 }));
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert!(engine.restart_pending());
        assert_eq!(engine.device().count("avail"), 0);
    }

    #[test]
    fn suspend_resumes_through_try_again() {
        let mut device = FakeDevice::new(PERIOD).with_states([DeviceState::Suspended]);
        device.resume.extend([Err(DeviceError::TryAgain), Err(DeviceError::TryAgain), Ok(())]);
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), PERIOD);
        assert_eq!(engine.device().count("resume"), 3);
    }

    #[test]
    fn hard_resume_failure_is_not_fatal() {
        let mut device = FakeDevice::new(PERIOD).with_states([DeviceState::Suspended]);
        device.resume.push_back(Err(DeviceError::Io { op: "resume", errno: 5 }));
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert_eq!(engine.device().count("avail"), 0);

        let n = engine.deliver_period(|_| {}).unwrap();
        assert_eq!(n, PERIOD);
    }

    static STUCK_SLEEPS: AtomicUsize = AtomicUsize::new(0);

    fn count_stuck_sleep(_: Duration) {
        STUCK_SLEEPS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn stuck_device_backs_off_every_pass() {
        const PASSES: usize = 50;
        let mut device = FakeDevice::new(PERIOD)
            .with_states((0..PASSES).map(|_| DeviceState::Suspended))
            .with_states((0..PASSES).map(|_| DeviceState::XRun));
        for _ in 0..PASSES {
            device.resume.push_back(Err(DeviceError::Io { op: "resume", errno: 5 }));
            device.prepare.push_back(Err(DeviceError::Io { op: "prepare", errno: 5 }));
        }
        let mut engine = engine(device).with_sleeper(count_stuck_sleep);

        for _ in 0..2 * PASSES {
            assert_eq!(engine.wait_for_period(), 0);
        }

        assert_eq!(STUCK_SLEEPS.load(Ordering::Relaxed), 2 * PASSES);
        assert_eq!(engine.device().count("avail"), 0);
    }

    static PREPARE_SLEEPS: AtomicUsize = AtomicUsize::new(0);

    fn count_prepare_sleep(_: Duration) {
        PREPARE_SLEEPS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn failed_prepare_after_avail_overrun_backs_off() {
        let mut device = FakeDevice::new(PERIOD);
        device.avail.push_back(Err(DeviceError::Overrun));
        device.prepare.push_back(Err(DeviceError::Io { op: "prepare", errno: 5 }));
        let mut engine = engine(device).with_sleeper(count_prepare_sleep);

        assert_eq!(engine.wait_for_period(), 0);
        assert!(engine.restart_pending());
        assert_eq!(PREPARE_SLEEPS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn overrun_on_avail_prepares_and_restarts() {
        let mut device = FakeDevice::new(PERIOD);
        device.avail.extend([Err(DeviceError::Overrun), Ok(0)]);
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert!(engine.restart_pending());
        assert_eq!(engine.wait_for_period(), 0);
        assert!(!engine.restart_pending());
        assert_eq!(engine.device().calls, ["avail", "prepare", "avail", "start"]);
    }

    #[test]
    fn suspend_on_avail_resumes() {
        let mut device = FakeDevice::new(PERIOD);
        device.avail.push_back(Err(DeviceError::Suspended));
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert!(engine.restart_pending());
        assert_eq!(engine.device().count("resume"), 1);
    }

    #[test]
    fn failed_start_keeps_restart_pending() {
        let mut device = FakeDevice::new(PERIOD);
        device.avail.extend([Err(DeviceError::Disconnected), Ok(0), Ok(0)]);
        device.start.push_back(Err(DeviceError::Io { op: "start", errno: 77 }));
        let mut engine = engine(device);

        engine.wait_for_period();
        engine.wait_for_period();
        assert!(engine.restart_pending());
        engine.wait_for_period();
        assert!(!engine.restart_pending());
        assert_eq!(engine.device().count("start"), 2);
    }

    #[test]
    fn not_enough_frames_waits() {
        let mut device = FakeDevice::new(PERIOD);
        device.avail.push_back(Ok(PERIOD - 1));
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert_eq!(engine.device().calls, ["avail", "wait"]);
    }

    #[test]
    fn wait_error_schedules_restart() {
        let mut device = FakeDevice::new(PERIOD);
        device.avail.push_back(Ok(0));
        device.wait.push_back(Err(DeviceError::Io { op: "wait", errno: 4 }));
        let mut engine = engine(device);

        assert_eq!(engine.wait_for_period(), 0);
        assert!(engine.restart_pending());
    }

    #[test]
    fn unknown_state_is_reported_and_skipped() {
        let device = FakeDevice::new(PERIOD).with_states([DeviceState::Other("draining")]);
        let mut engine = engine(device);
        assert_eq!(engine.wait_for_period(), PERIOD);
    }

    #[test]
    fn short_mapping_drops_the_period() {
        let mut device = FakeDevice::new(PERIOD);
        device.map.push_back(MapScript::Short(100));
        let mut engine = engine(device);

        let mut calls = 0;
        assert_eq!(engine.deliver_period(|_| calls += 1).unwrap(), 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn non_contiguous_layout_is_fatal() {
        let mut device = FakeDevice::new(PERIOD);
        device.map.push_back(MapScript::Layout { first_bit: 0, step_bits: 32 });
        let mut engine = engine(device);

        let err = engine.deliver_period(|_| panic!("sink must not run")).unwrap_err();
        assert!(matches!(err, CaptureError::NonContiguousLayout(_)));
    }

    #[test]
    fn driver_layout_error_is_fatal() {
        let mut device = FakeDevice::new(PERIOD);
        device.map.push_back(MapScript::BeginError(DeviceError::Layout));
        let mut engine = engine(device);

        let err = engine.deliver_period(|_| {}).unwrap_err();
        assert!(matches!(err, CaptureError::NonContiguousLayout(_)));
    }

    #[test]
    fn commit_failure_is_logged_not_fatal() {
        let mut device = FakeDevice::new(PERIOD).with_signal(|_| 7);
        device.map.push_back(MapScript::CommitError(DeviceError::Io { op: "commit", errno: 5 }));
        let mut engine = engine(device);

        let mut seen = 0;
        assert_eq!(engine.deliver_period(|s| seen += s.len()).unwrap(), PERIOD);
        assert_eq!(seen, PERIOD);
    }

    #[test]
    fn begin_overrun_recovers() {
        let mut device = FakeDevice::new(PERIOD);
        device.map.push_back(MapScript::BeginError(DeviceError::Overrun));
        let mut engine = engine(device);

        assert_eq!(engine.deliver_period(|_| {}).unwrap(), 0);
        assert!(engine.restart_pending());
        assert_eq!(engine.device().count("prepare"), 1);
    }

    #[test]
    fn levels_follow_last_period() {
        let device = FakeDevice::new(PERIOD).with_signal(|n| if n % 2 == 0 { 400 } else { -200 });
        let mut engine = engine(device);

        engine.deliver_period(|_| {}).unwrap();
        let levels = engine.levels();
        assert_eq!(levels.peak, 400.0);
        assert!((levels.mean - 100.0).abs() < 1e-6);
        assert!((levels.mean_abs - 300.0).abs() < 1e-6);
    }
}
