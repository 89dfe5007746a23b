//! Scripted `PcmDevice` for engine and tuner tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::error::DeviceError;
use crate::models::state::DeviceState;
use crate::traits::pcm_device::{MappedArea, PcmDevice};

/// How the next `read_mapped` call behaves.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MapScript {
    Full,
    Short(usize),
    Layout { first_bit: u32, step_bits: u32 },
    BeginError(DeviceError),
    CommitError(DeviceError),
}

/// Each queue is consumed one entry per call; an empty queue falls back to
/// a healthy running device with a full period available.
pub(crate) struct FakeDevice {
    pub states: Mutex<VecDeque<DeviceState>>,
    pub avail: VecDeque<Result<usize, DeviceError>>,
    pub wait: VecDeque<Result<bool, DeviceError>>,
    pub start: VecDeque<Result<(), DeviceError>>,
    pub prepare: VecDeque<Result<(), DeviceError>>,
    pub resume: VecDeque<Result<(), DeviceError>>,
    pub map: VecDeque<MapScript>,
    /// Driver calls in order, for asserting recovery sequences.
    pub calls: Vec<&'static str>,
    period: usize,
    position: usize,
    signal: Box<dyn FnMut(usize) -> i16 + Send>,
}

impl FakeDevice {
    pub fn new(period: usize) -> Self {
        Self {
            states: Mutex::new(VecDeque::new()),
            avail: VecDeque::new(),
            wait: VecDeque::new(),
            start: VecDeque::new(),
            prepare: VecDeque::new(),
            resume: VecDeque::new(),
            map: VecDeque::new(),
            calls: Vec::new(),
            period,
            position: 0,
            signal: Box::new(|_| 0),
        }
    }

    /// Generate sample `n` of the stream with `signal(n)`.
    pub fn with_signal(mut self, signal: impl FnMut(usize) -> i16 + Send + 'static) -> Self {
        self.signal = Box::new(signal);
        self
    }

    pub fn with_states(self, states: impl IntoIterator<Item = DeviceState>) -> Self {
        self.states.lock().extend(states);
        self
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn render(&mut self, frames: usize) -> Vec<i16> {
        let start = self.position;
        (start..start + frames).map(|n| (self.signal)(n)).collect()
    }
}

impl PcmDevice for FakeDevice {
    fn state(&self) -> DeviceState {
        self.states.lock().pop_front().unwrap_or(DeviceState::Running)
    }

    fn avail(&mut self) -> Result<usize, DeviceError> {
        self.calls.push("avail");
        self.avail.pop_front().unwrap_or(Ok(self.period))
    }

    fn wait(&mut self, _timeout_ms: u32) -> Result<bool, DeviceError> {
        self.calls.push("wait");
        self.wait.pop_front().unwrap_or(Ok(true))
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.calls.push("start");
        self.start.pop_front().unwrap_or(Ok(()))
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.calls.push("prepare");
        self.prepare.pop_front().unwrap_or(Ok(()))
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.calls.push("resume");
        self.resume.pop_front().unwrap_or(Ok(()))
    }

    fn read_mapped(
        &mut self,
        frames: usize,
        consume: &mut dyn FnMut(MappedArea<'_>) -> usize,
    ) -> Result<usize, DeviceError> {
        self.calls.push("read_mapped");
        let script = self.map.pop_front().unwrap_or(MapScript::Full);

        let (len, first_bit, step_bits) = match script {
            MapScript::Full | MapScript::CommitError(_) => (frames, 0, 16),
            MapScript::Short(len) => (len.min(frames), 0, 16),
            MapScript::Layout { first_bit, step_bits } => (frames, first_bit, step_bits),
            MapScript::BeginError(e) => return Err(e),
        };

        let samples = self.render(len);
        let committed = consume(MappedArea { samples: &samples, first_bit, step_bits });
        self.position += committed;

        match script {
            MapScript::CommitError(e) => Err(e),
            _ => Ok(committed),
        }
    }
}
