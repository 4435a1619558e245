//! Status text shown next to the video.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::record::{RecordingController, RecordingStatus};

/// Flight data reported by the vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Telemetry {
    /// Decimetres above take-off point.
    pub height: i32,
    pub ground_speed: i32,
    pub battery_percentage: u8,
    pub wifi_strength: u8,
}

/// Local state shown alongside telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HudStatus {
    pub zoomed: bool,
    pub tracking: bool,
    /// Elapsed time of the open recording, if any.
    pub recording: Option<Duration>,
}

/// Where a running daemon reads the local half of the HUD from.
#[derive(Clone)]
pub struct HudSources {
    pub zoomed: Arc<AtomicBool>,
    pub tracking: Arc<AtomicBool>,
    pub recorder: Arc<RecordingController>,
}

impl HudSources {
    pub fn snapshot(&self) -> HudStatus {
        HudStatus {
            zoomed: self.zoomed.load(Ordering::SeqCst),
            tracking: self.tracking.load(Ordering::SeqCst),
            recording: match self.recorder.status() {
                RecordingStatus::Recording { elapsed, .. } => Some(elapsed),
                RecordingStatus::Idle => None,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Element {
    Altitude,
    Speed,
    Battery,
    Network,
    Camera,
    Tracking,
    Recording,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reading {
    Number(i64),
    Flag(bool),
    Seconds(Option<u64>),
}

impl Element {
    fn read(&self, telemetry: &Telemetry, status: &HudStatus) -> Reading {
        match self {
            Element::Altitude => Reading::Number(telemetry.height as i64),
            Element::Speed => Reading::Number(telemetry.ground_speed as i64),
            Element::Battery => Reading::Number(telemetry.battery_percentage as i64),
            Element::Network => Reading::Number(telemetry.wifi_strength as i64),
            Element::Camera => Reading::Flag(status.zoomed),
            Element::Tracking => Reading::Flag(status.tracking),
            Element::Recording => Reading::Seconds(status.recording.map(|d| d.as_secs())),
        }
    }

    fn format(&self, reading: Reading) -> String {
        match (self, reading) {
            (Element::Altitude, Reading::Number(n)) => format!("ALT {:>3}", n),
            (Element::Speed, Reading::Number(n)) => format!("SPD {:>3}", n),
            (Element::Battery, Reading::Number(n)) => format!("BAT {:>3}%", n),
            (Element::Network, Reading::Number(n)) => format!("NET {:>3}%", n),
            (Element::Camera, Reading::Flag(zoomed)) => {
                format!("CAM {}", if zoomed { "VID" } else { "PIC" })
            }
            (Element::Tracking, Reading::Flag(on)) => {
                format!("TRACK {}", if on { "Y" } else { "N" })
            }
            (Element::Recording, Reading::Seconds(Some(secs))) => {
                format!("REC {:02}:{:02}", secs / 60, secs % 60)
            }
            _ => String::new(),
        }
    }
}

struct Slot {
    element: Element,
    reading: Option<Reading>,
    text: String,
}

pub struct Hud {
    slots: Vec<Slot>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        let slots = [
            Element::Altitude,
            Element::Speed,
            Element::Battery,
            Element::Network,
            Element::Camera,
            Element::Tracking,
            Element::Recording,
        ]
        .into_iter()
        .map(|element| Slot {
            element,
            reading: None,
            text: String::new(),
        })
        .collect();
        Self { slots }
    }

    /// Refresh every element. Returns true if any line changed.
    pub fn update(&mut self, telemetry: &Telemetry, status: &HudStatus) -> bool {
        let mut changed = false;
        for slot in &mut self.slots {
            let reading = slot.element.read(telemetry, status);
            if slot.reading != Some(reading) {
                slot.reading = Some(reading);
                slot.text = slot.element.format(reading);
                changed = true;
            }
        }
        changed
    }

    /// Non-empty lines, top to bottom.
    pub fn lines(&self) -> Vec<&str> {
        self.slots
            .iter()
            .map(|slot| slot.text.as_str())
            .filter(|text| !text.is_empty())
            .collect()
    }
}
