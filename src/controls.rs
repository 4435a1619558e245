//! Keyboard input mapping.
//!
//! Every key resolves through `ControlMap` to either a direct flight command (sent with
//! the current speed times a scale factor while held, and with speed 0 on release) or a
//! custom action that fires once on press.

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pipeline::InputEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlightCommand {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
    Clockwise,
    CounterClockwise,
}

impl FlightCommand {
    pub fn name(&self) -> &'static str {
        match self {
            FlightCommand::Forward => "forward",
            FlightCommand::Backward => "backward",
            FlightCommand::Left => "left",
            FlightCommand::Right => "right",
            FlightCommand::Up => "up",
            FlightCommand::Down => "down",
            FlightCommand::Clockwise => "clockwise",
            FlightCommand::CounterClockwise => "counter_clockwise",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomAction {
    TakeOff,
    Land,
    PalmLand,
    ToggleTracking,
    ToggleRecording,
    ToggleZoom,
    TakePicture,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Direct { command: FlightCommand, scale: u32 },
    Custom(CustomAction),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// What a key event resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Fly { command: FlightCommand, speed: u32 },
    Action(CustomAction),
    Ignored,
}

#[derive(Clone, Debug)]
pub struct ControlMap {
    bindings: BTreeMap<String, Binding>,
}

impl Default for ControlMap {
    fn default() -> Self {
        use Binding::{Custom, Direct};
        use CustomAction::*;
        use FlightCommand::*;

        let table = [
            ("w", Direct { command: Forward, scale: 1 }),
            ("s", Direct { command: Backward, scale: 1 }),
            ("a", Direct { command: Left, scale: 1 }),
            ("d", Direct { command: Right, scale: 1 }),
            ("space", Direct { command: Up, scale: 1 }),
            ("left shift", Direct { command: Down, scale: 1 }),
            ("right shift", Direct { command: Down, scale: 1 }),
            ("q", Direct { command: CounterClockwise, scale: 1 }),
            ("e", Direct { command: Clockwise, scale: 1 }),
            // arrow keys: fast turns and altitude changes
            ("left", Direct { command: CounterClockwise, scale: 2 }),
            ("right", Direct { command: Clockwise, scale: 2 }),
            ("up", Direct { command: Up, scale: 2 }),
            ("down", Direct { command: Down, scale: 2 }),
            ("tab", Custom(TakeOff)),
            ("backspace", Custom(Land)),
            ("p", Custom(PalmLand)),
            ("t", Custom(ToggleTracking)),
            ("r", Custom(ToggleRecording)),
            ("z", Custom(ToggleZoom)),
            ("enter", Custom(TakePicture)),
            ("return", Custom(TakePicture)),
            ("escape", Custom(Quit)),
        ];
        Self {
            bindings: table
                .into_iter()
                .map(|(key, binding)| (key.to_string(), binding))
                .collect(),
        }
    }
}

impl ControlMap {
    pub fn empty() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    pub fn bind(&mut self, key: &str, binding: Binding) {
        self.bindings.insert(normalize_key(key), binding);
    }

    pub fn binding(&self, key: &str) -> Option<Binding> {
        self.bindings.get(&normalize_key(key)).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn dispatch(&self, key: &str, state: KeyState, speed: u32) -> Dispatch {
        match (self.binding(key), state) {
            (None, _) => Dispatch::Ignored,
            (Some(Binding::Direct { command, scale }), KeyState::Pressed) => Dispatch::Fly {
                command,
                speed: speed.saturating_mul(scale),
            },
            (Some(Binding::Direct { command, .. }), KeyState::Released) => {
                Dispatch::Fly { command, speed: 0 }
            }
            (Some(Binding::Custom(action)), KeyState::Pressed) => Dispatch::Action(action),
            (Some(Binding::Custom(_)), KeyState::Released) => Dispatch::Ignored,
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// The vehicle, as seen by the keyboard.
pub trait FlightControl {
    fn send(&mut self, command: FlightCommand, speed: u32) -> Result<()>;

    fn takeoff(&mut self) -> Result<()>;

    fn land(&mut self) -> Result<()>;

    fn palm_land(&mut self) -> Result<()>;

    fn take_picture(&mut self) -> Result<()>;

    /// Switch between the zoomed video mode and the wide picture mode.
    fn set_zoom(&mut self, zoomed: bool) -> Result<()>;
}

/// Keyboard state for one vehicle: bindings, current speed and zoom.
///
/// Pipeline-level actions (tracking, recording, quit) are forwarded as `InputEvent`s;
/// everything else goes to the vehicle.
pub struct KeyboardSession<C: FlightControl> {
    map: ControlMap,
    speed: u32,
    zoomed: Arc<AtomicBool>,
    vehicle: C,
    events: Sender<InputEvent>,
}

impl<C: FlightControl> KeyboardSession<C> {
    pub fn new(map: ControlMap, speed: u32, vehicle: C, events: Sender<InputEvent>) -> Self {
        Self {
            map,
            speed,
            zoomed: Arc::new(AtomicBool::new(false)),
            vehicle,
            events,
        }
    }

    pub fn vehicle(&self) -> &C {
        &self.vehicle
    }

    pub fn is_zoomed(&self) -> bool {
        self.zoomed.load(Ordering::SeqCst)
    }

    /// Shared zoom state, for status displays running on other threads.
    pub fn zoom_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.zoomed)
    }

    pub fn handle(&mut self, key: &str, state: KeyState) -> Result<Dispatch> {
        let dispatch = self.map.dispatch(key, state, self.speed);
        match dispatch {
            Dispatch::Ignored => {}
            Dispatch::Fly { command, speed } => self.vehicle.send(command, speed)?,
            Dispatch::Action(action) => match action {
                CustomAction::TakeOff => self.vehicle.takeoff()?,
                CustomAction::Land => self.vehicle.land()?,
                CustomAction::PalmLand => self.vehicle.palm_land()?,
                CustomAction::TakePicture => self.vehicle.take_picture()?,
                CustomAction::ToggleZoom => {
                    let zoomed = !self.is_zoomed();
                    self.vehicle.set_zoom(zoomed)?;
                    self.zoomed.store(zoomed, Ordering::SeqCst);
                }
                CustomAction::ToggleTracking => self.forward(InputEvent::ToggleTracking)?,
                CustomAction::ToggleRecording => self.forward(InputEvent::ToggleRecording)?,
                CustomAction::Quit => self.forward(InputEvent::Quit)?,
            },
        }
        Ok(dispatch)
    }

    fn forward(&self, event: InputEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| anyhow!("pipeline stopped listening for {:?}", event))
    }
}
