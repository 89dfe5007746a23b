//! pitch-gauge: listens to an instrument and shows its pitch on analog gauges.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use pitch_gauge_core::{RatePolicy, TunerConfiguration};

static STOP: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "pitch-gauge")]
#[command(about = "Real-time pitch detector driving analog gauges", long_about = None)]
struct Cli {
    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ALSA capture device such as hw:1,0,0 (default: first capture-capable device)
    #[arg(short, long)]
    device: Option<String>,

    /// spidev node of the gauge board; readings are logged when absent
    #[arg(short, long)]
    spi: Option<String>,

    /// Capture at the highest rate the device offers
    #[arg(long)]
    highest_rate: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Exercise the gauge needles instead of tuning
    #[arg(long)]
    sweep: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<TunerConfiguration, String> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => TunerConfiguration::default(),
    };

    if let Some(device) = &cli.device {
        config.device = Some(device.clone());
    }
    if let Some(spi) = &cli.spi {
        config.gauge_device = Some(spi.clone());
    }
    if cli.highest_rate {
        config.rate_policy = RatePolicy::Highest;
    }

    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<TunerConfiguration, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config {}: {}", path.display(), e))
}

extern "C" fn handle_signal(_: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR {
            log::warn!("failed to install handler for signal {}", signal);
        }
    }
}

#[cfg(target_os = "linux")]
fn run(cli: Cli) -> Result<(), String> {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use pitch_gauge_core::{CaptureEngine, GaugeOutput, GaugeSweep, LogGauge, Tuner};
    use pitch_gauge_linux::{AlsaCapture, DeviceEnumerator, SpiGauge};

    if cli.list_devices {
        let devices = DeviceEnumerator::list_capture_devices().map_err(|e| e.to_string())?;
        if devices.is_empty() {
            println!("no capture devices");
        }
        for device in devices {
            println!("{}\t{}\t{}", device.id, device.card_name, device.pcm_name);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    install_signal_handlers();

    let gauge: Arc<dyn GaugeOutput> = match &config.gauge_device {
        Some(path) => {
            let spi = SpiGauge::open(path).map_err(|e| e.to_string())?;
            log::info!("gauges on {} at {} Hz", path, spi.speed_hz());
            Arc::new(spi)
        }
        None => Arc::new(LogGauge::new()),
    };

    if cli.sweep {
        const TICK: Duration = Duration::from_millis(10);
        log::info!("sweeping gauges, interrupt to stop");
        for reading in GaugeSweep::new(0.1, TICK.as_secs_f32()) {
            if STOP.load(Ordering::Relaxed) {
                break;
            }
            gauge.show(&reading);
            thread::sleep(TICK);
        }
        return Ok(());
    }

    let device = match &config.device {
        Some(name) => name.clone(),
        None => {
            let found = DeviceEnumerator::first_capture_device().map_err(|e| e.to_string())?;
            log::info!("using {} ({}, {})", found.id, found.card_name, found.pcm_name);
            found.id
        }
    };

    let (capture, params) = AlsaCapture::open(&device, &config).map_err(|e| e.to_string())?;
    let engine = CaptureEngine::new(capture, params);
    let mut tuner = Tuner::new(engine, &config, gauge).map_err(|e| e.to_string())?;

    tuner.run(&STOP).map_err(|e| e.to_string())
}

#[cfg(not(target_os = "linux"))]
fn run(cli: Cli) -> Result<(), String> {
    load_config(&cli)?;
    install_signal_handlers();
    Err("ALSA capture is only available on Linux".into())
}
