//! ALSA capture device enumeration.
//!
//! Walks every sound card and its PCM devices, keeping the ones whose first
//! subdevice has a capture stream.

use alsa::card;
use alsa::ctl::{Ctl, DeviceIter};
use alsa::Direction;

use pitch_gauge_core::models::error::CaptureError;

/// Only the first subdevice of each PCM is considered.
const SUBDEVICE: u32 = 0;

/// A capture-capable PCM, addressable by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    /// `hw:C,D,S` name accepted by `AlsaCapture::open`.
    pub id: String,
    pub card_name: String,
    pub pcm_name: String,
}

/// Capture device enumerator over the ALSA control interface.
pub struct DeviceEnumerator;

impl DeviceEnumerator {
    /// List capture-capable PCM devices in card, then device order.
    pub fn list_capture_devices() -> Result<Vec<CaptureDevice>, CaptureError> {
        let mut devices = Vec::new();

        for card in card::Iter::new() {
            let card = card.map_err(|e| enumeration_failed("card iteration", &e))?;
            let index = card.get_index();
            let card_name = card
                .get_name()
                .unwrap_or_else(|_| format!("card {}", index));
            let ctl = Ctl::from_card(&card, false)
                .map_err(|e| enumeration_failed("control open", &e))?;

            for device in DeviceIter::new(&ctl) {
                match ctl.pcm_info(device as u32, SUBDEVICE, Direction::Capture) {
                    Ok(info) => {
                        let id = device_id(index, device, SUBDEVICE);
                        log::debug!("{}: capture capable", id);
                        devices.push(CaptureDevice {
                            id,
                            card_name: card_name.clone(),
                            pcm_name: info.get_name().unwrap_or_default().to_string(),
                        });
                    }
                    Err(e) if e.errno() as i32 == libc::ENOENT => {
                        log::debug!("hw:{},{}: no capture stream, skipping", index, device);
                    }
                    Err(e) => return Err(enumeration_failed("pcm info", &e)),
                }
            }
        }

        Ok(devices)
    }

    /// The first capture-capable device on the system.
    pub fn first_capture_device() -> Result<CaptureDevice, CaptureError> {
        Self::list_capture_devices()?
            .into_iter()
            .next()
            .ok_or_else(|| CaptureError::DeviceNotAvailable("there are no capture devices".into()))
    }
}

fn device_id(card: i32, device: i32, subdevice: u32) -> String {
    format!("hw:{},{},{}", card, device, subdevice)
}

fn enumeration_failed(op: &str, err: &alsa::Error) -> CaptureError {
    CaptureError::DeviceNotAvailable(format!("{} failed: {}", op, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_format() {
        assert_eq!(device_id(1, 0, SUBDEVICE), "hw:1,0,0");
        assert_eq!(device_id(0, 3, 2), "hw:0,3,2");
    }
}
