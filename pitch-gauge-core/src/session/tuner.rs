use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::config::TunerConfiguration;
use crate::models::error::CaptureError;
use crate::models::pitch::{GaugeReading, PitchEstimate};
use crate::processing::estimator::PitchEstimator;
use crate::processing::ring_buffer::VirtualRingBuffer;
use crate::session::capture_engine::CaptureEngine;
use crate::traits::gauge_output::GaugeOutput;
use crate::traits::pcm_device::PcmDevice;

/// Top-level tuner: capture, history, analysis, display.
///
/// ```text
/// [PcmDevice] → [CaptureEngine] → i16→f32 → [VirtualRingBuffer]
///                                                   ↓ past(nf)
///                          [GaugeOutput] ← [PitchEstimator]
/// ```
///
/// Owns every resource; dropping the tuner closes the device and unmaps
/// the ring buffer.
pub struct Tuner<D: PcmDevice> {
    engine: CaptureEngine<D>,
    ring: VirtualRingBuffer,
    estimator: PitchEstimator,
    gauge: Arc<dyn GaugeOutput>,
    scratch: Vec<f32>,
    analysis_interval: usize,
    periods_since_estimate: usize,
    captured: usize,
}

impl<D: PcmDevice> Tuner<D> {
    pub fn new(
        engine: CaptureEngine<D>,
        config: &TunerConfiguration,
        gauge: Arc<dyn GaugeOutput>,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let params = *engine.params();
        let window = config.analysis_window(&params);
        let ring_bytes = (window.history + params.period_frames) * mem::size_of::<f32>();
        let ring = VirtualRingBuffer::with_unit(ring_bytes, config.page_unit)?;

        log::info!(
            "tuner: {} Hz, period {} frames, {} lags over {} samples, ring {} bytes",
            params.sample_rate_hz,
            params.period_frames,
            window.lags,
            window.history,
            ring.capacity()
        );

        Ok(Self {
            estimator: PitchEstimator::new(window, params.sample_rate_hz, config),
            engine,
            ring,
            gauge,
            scratch: Vec::with_capacity(params.period_frames),
            analysis_interval: config.analysis_interval,
            periods_since_estimate: 0,
            captured: 0,
        })
    }

    pub fn engine(&self) -> &CaptureEngine<D> {
        &self.engine
    }

    /// Deliver one period and, when due, estimate and display.
    ///
    /// Returns the estimate if this step ran an analysis cycle.
    pub fn step(&mut self) -> Result<Option<PitchEstimate>, CaptureError> {
        let ring = &mut self.ring;
        let scratch = &mut self.scratch;
        let delivered = self.engine.deliver_period(|samples| {
            scratch.clear();
            scratch.extend(samples.iter().map(|&s| s as f32));
            ring.append_samples(scratch.as_slice());
        })?;

        if delivered == 0 {
            return Ok(None);
        }
        self.captured = self.captured.saturating_add(delivered);
        self.periods_since_estimate += 1;

        let history = self.estimator.window().history;
        if self.captured < history || self.periods_since_estimate < self.analysis_interval {
            return Ok(None);
        }
        self.periods_since_estimate = 0;

        let estimate = self.estimator.estimate(self.ring.past_samples(history));
        match estimate.frequency_hz {
            Some(f) => log::debug!("pitch {:.2} Hz, energy {:.0}", f, estimate.energy),
            None => log::debug!("no pitch, energy {:.0}", estimate.energy),
        }
        self.gauge.show(&estimate.reading());
        Ok(Some(estimate))
    }

    /// Run until `stop` is set, then park the gauges.
    ///
    /// Returns early only on a fatal capture error.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), CaptureError> {
        while !stop.load(Ordering::Relaxed) {
            self.step()?;
        }
        log::info!("tuner stopped after {} frames", self.captured);
        self.gauge.show(&GaugeReading::NEUTRAL);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use parking_lot::Mutex;

    use super::*;
    use crate::models::config::CaptureParams;
    use crate::processing::musical::mod1rd;
    use crate::session::fake_device::{FakeDevice, MapScript};

    const RATE: u32 = 48_000;

    #[derive(Default)]
    struct RecordingGauge {
        readings: Mutex<Vec<GaugeReading>>,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl GaugeOutput for RecordingGauge {
        fn show(&self, reading: &GaugeReading) {
            let mut readings = self.readings.lock();
            readings.push(*reading);
            if let Some((limit, stop)) = &self.stop_after {
                if readings.len() >= *limit {
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    fn no_sleep(_: std::time::Duration) {}

    fn a440(n: usize) -> i16 {
        (8000.0 * (2.0 * PI * 440.0 * n as f32 / RATE as f32).sin()) as i16
    }

    fn tuner(
        device: FakeDevice,
        config: &TunerConfiguration,
        gauge: Arc<RecordingGauge>,
    ) -> Tuner<FakeDevice> {
        let params = CaptureParams::derive(RATE, config.f_min());
        let engine = CaptureEngine::new(device, params).with_sleeper(no_sleep);
        Tuner::new(engine, config, gauge).unwrap()
    }

    #[test]
    fn a440_end_to_end() {
        let config = TunerConfiguration::default();
        let gauge = Arc::new(RecordingGauge::default());
        let mut tuner = tuner(FakeDevice::new(2048).with_signal(a440), &config, gauge.clone());

        // 8192 samples of history are needed: 4 periods of 2048.
        for _ in 0..3 {
            assert_eq!(tuner.step().unwrap(), None);
        }
        let estimate = tuner.step().unwrap().expect("estimate after four periods");

        assert_relative_eq!(estimate.frequency_hz.unwrap(), 440.0, max_relative = 0.01);
        assert!(estimate.loudness > 0.9);
        assert_abs_diff_eq!(estimate.octave, 4.75 / 8.0, epsilon = 1e-3);
        assert_abs_diff_eq!(estimate.semitone, 0.75, epsilon = 5e-3);
        // A4 sits on a semitone boundary, so deviation may land either side of 0.
        let deviation = mod1rd(estimate.deviation);
        assert!(deviation.min(1.0 - deviation) < 1e-2, "deviation {}", estimate.deviation);

        let readings = gauge.readings.lock();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0], estimate.reading());
    }

    #[test]
    fn analysis_interval_skips_periods() {
        let config = TunerConfiguration { analysis_interval: 2, ..Default::default() };
        let gauge = Arc::new(RecordingGauge::default());
        let mut tuner = tuner(FakeDevice::new(2048).with_signal(a440), &config, gauge.clone());

        let analysed: Vec<bool> = (0..8).map(|_| tuner.step().unwrap().is_some()).collect();
        assert_eq!(analysed, [false, false, false, true, false, true, false, true]);
        assert_eq!(gauge.readings.lock().len(), 3);
    }

    #[test]
    fn silence_shows_neutral_needles() {
        let config = TunerConfiguration::default();
        let gauge = Arc::new(RecordingGauge::default());
        let mut tuner = tuner(FakeDevice::new(2048), &config, gauge.clone());

        for _ in 0..4 {
            tuner.step().unwrap();
        }
        let readings = gauge.readings.lock();
        assert_eq!(readings.as_slice(), [GaugeReading::NEUTRAL]);
    }

    #[test]
    fn dropped_period_does_not_count_as_history() {
        let config = TunerConfiguration::default();
        let gauge = Arc::new(RecordingGauge::default());
        let mut device = FakeDevice::new(2048).with_signal(a440);
        device.map.push_back(MapScript::Short(10));
        let mut tuner = tuner(device, &config, gauge);

        let analysed: Vec<bool> = (0..5).map(|_| tuner.step().unwrap().is_some()).collect();
        assert_eq!(analysed, [false, false, false, false, true]);
    }

    #[test]
    fn run_stops_on_flag_and_parks_gauges() {
        let stop = Arc::new(AtomicBool::new(false));
        let gauge = Arc::new(RecordingGauge {
            readings: Mutex::new(Vec::new()),
            stop_after: Some((2, stop.clone())),
        });
        let config = TunerConfiguration::default();
        let mut tuner = tuner(FakeDevice::new(2048).with_signal(a440), &config, gauge.clone());

        tuner.run(&stop).unwrap();

        let readings = gauge.readings.lock();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[2], GaugeReading::NEUTRAL);
    }

    #[test]
    fn run_surfaces_fatal_layout() {
        let mut device = FakeDevice::new(2048);
        device.map.push_back(MapScript::Layout { first_bit: 16, step_bits: 16 });
        let config = TunerConfiguration::default();
        let mut tuner = tuner(device, &config, Arc::new(RecordingGauge::default()));

        let err = tuner.run(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, CaptureError::NonContiguousLayout(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TunerConfiguration::default();
        let bad = TunerConfiguration { peak_threshold: 2.0, ..Default::default() };
        let params = CaptureParams::derive(RATE, config.f_min());
        let engine = CaptureEngine::new(FakeDevice::new(2048), params);

        let result = Tuner::new(engine, &bad, Arc::new(RecordingGauge::default()));
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }
}
