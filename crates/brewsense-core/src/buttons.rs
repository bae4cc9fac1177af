//! Coffee maker button panel and enable switch
//!
//! The panel buttons are wired as a matrix on two drive lines (A and B); a
//! third line switches the machine on. Presses are timed in strobe cycles so
//! the panel controller, which scans its buttons once per strobe, always sees
//! a press for the same number of scans.
//!
//! The enable switch starts OFF. While it is off every brew request is
//! rejected and the drive lines stay released.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::digital::{OutputPin, PinState};

use crate::error::{Error, Result};
use crate::sampling::StrobeListener;

/// Default press duration in strobe cycles
pub const DEFAULT_BUTTON_PRESS_STROBES: u16 = 50;

/// Brew requests available on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    OneCup,
    TwoCups,
    HotWater,
}

impl Button {
    /// Which of the A/B lines the button needs
    const fn lines(self) -> (bool, bool) {
        match self {
            Self::OneCup => (true, false),
            Self::TwoCups => (false, true),
            Self::HotWater => (true, true),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::OneCup => "one cup",
            Self::TwoCups => "two cups",
            Self::HotWater => "hot water",
        }
    }
}

/// One open-drain style drive line
///
/// Active drives the line high (low when `inverted`); idle drives the
/// opposite level, which the panel reads as released.
pub struct ButtonLine<P> {
    pin: P,
    line: &'static str,
    inverted: bool,
    active: bool,
}

impl<P: OutputPin> ButtonLine<P> {
    pub fn new(pin: P, line: &'static str, inverted: bool) -> Self {
        Self {
            pin,
            line,
            inverted,
            active: false,
        }
    }

    pub fn set_active(&mut self, active: bool) -> Result<()> {
        self.pin
            .set_state(PinState::from(active != self.inverted))
            .map_err(|_| Error::Gpio { line: self.line })?;
        self.active = active;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn release(self) -> P {
        self.pin
    }
}

/// Drive lines of the panel
///
/// The minimal wiring only has the on/off line; brew requests then fail with
/// [`Error::NoButtonMatrix`].
pub struct ButtonPanel<P> {
    pub buttons_a: Option<ButtonLine<P>>,
    pub buttons_b: Option<ButtonLine<P>>,
    pub button_onoff: ButtonLine<P>,
}

impl<P: OutputPin> ButtonPanel<P> {
    pub fn new(buttons_a: ButtonLine<P>, buttons_b: ButtonLine<P>, button_onoff: ButtonLine<P>) -> Self {
        Self {
            buttons_a: Some(buttons_a),
            buttons_b: Some(buttons_b),
            button_onoff,
        }
    }

    /// Panel with only the on/off line
    pub fn onoff_only(button_onoff: ButtonLine<P>) -> Self {
        Self {
            buttons_a: None,
            buttons_b: None,
            button_onoff,
        }
    }

    pub fn has_matrix(&self) -> bool {
        self.buttons_a.is_some() && self.buttons_b.is_some()
    }

    fn drive_matrix(&mut self, button: Option<Button>) -> Result<()> {
        let (a, b) = button.map_or((false, false), Button::lines);
        if let Some(line) = self.buttons_a.as_mut() {
            line.set_active(a)?;
        }
        if let Some(line) = self.buttons_b.as_mut() {
            line.set_active(b)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Press {
    /// Accepted, waiting for the next strobe to start
    Pending(Button),
    Held { button: Button, remaining: u16 },
}

struct State<P> {
    panel: ButtonPanel<P>,
    enabled: bool,
    press: Option<Press>,
    press_strobes: u16,
    completed_presses: u32,
    gpio_failures: u32,
}

/// Button panel shared between the strobe edge handler and request callers
pub struct ButtonControl<P> {
    state: BlockingMutex<CriticalSectionRawMutex, RefCell<State<P>>>,
}

impl<P: OutputPin> ButtonControl<P> {
    /// Take over `panel`. Lines are not touched until [`ButtonControl::setup`].
    pub fn new(panel: ButtonPanel<P>, press_strobes: u16) -> Self {
        Self {
            state: BlockingMutex::new(RefCell::new(State {
                panel,
                enabled: false,
                press: None,
                press_strobes: press_strobes.max(1),
                completed_presses: 0,
                gpio_failures: 0,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State<P>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Drive every line to its idle level; the machine stays switched off
    pub fn setup(&self) -> Result<()> {
        self.release_all()
    }

    pub fn enabled(&self) -> bool {
        self.with(|state| state.enabled)
    }

    /// Flip the enable switch. Turning it off cancels any press in progress.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.with(|state| {
            state.panel.button_onoff.set_active(enabled)?;
            state.enabled = enabled;
            if !enabled {
                state.press = None;
                state.panel.drive_matrix(None)?;
            }
            Ok(())
        })
    }

    /// Queue a momentary press, started on the next strobe
    pub fn request(&self, button: Button) -> Result<()> {
        self.with(|state| {
            if !state.panel.has_matrix() {
                return Err(Error::NoButtonMatrix);
            }
            if !state.enabled {
                return Err(Error::NotEnabled);
            }
            if state.press.is_some() {
                return Err(Error::ButtonBusy);
            }
            state.press = Some(Press::Pending(button));
            Ok(())
        })
    }

    /// Button currently queued or held
    pub fn pressing(&self) -> Option<Button> {
        self.with(|state| match state.press? {
            Press::Pending(button) | Press::Held { button, .. } => Some(button),
        })
    }

    pub fn completed_presses(&self) -> u32 {
        self.with(|state| state.completed_presses)
    }

    /// Line writes that failed inside the strobe handler
    pub fn gpio_failures(&self) -> u32 {
        self.with(|state| state.gpio_failures)
    }

    /// Release every line and switch the machine off
    pub fn release_all(&self) -> Result<()> {
        self.with(|state| {
            state.press = None;
            state.enabled = false;
            let matrix = state.panel.drive_matrix(None);
            let onoff = state.panel.button_onoff.set_active(false);
            matrix.and(onoff)
        })
    }

    /// Give the lines back
    pub fn into_panel(self) -> ButtonPanel<P> {
        self.state.into_inner().into_inner().panel
    }

    fn advance(state: &mut State<P>) -> Result<()> {
        match state.press {
            None => Ok(()),
            Some(Press::Pending(button)) => {
                state.press = Some(Press::Held {
                    button,
                    remaining: state.press_strobes,
                });
                state.panel.drive_matrix(Some(button))
            }
            Some(Press::Held { button, remaining }) => {
                if remaining > 1 {
                    state.press = Some(Press::Held {
                        button,
                        remaining: remaining - 1,
                    });
                    return Ok(());
                }
                state.press = None;
                state.completed_presses += 1;
                state.panel.drive_matrix(None)
            }
        }
    }
}

impl<P: OutputPin> StrobeListener for ButtonControl<P> {
    fn on_strobe(&self) {
        self.with(|state| {
            if Self::advance(state).is_err() {
                // Drop the press and try to leave the matrix released
                state.gpio_failures += 1;
                state.press = None;
                let _ = state.panel.drive_matrix(None);
            }
        })
    }
}
