//! Polled user button with debounce and long-press detection.
//!
//! ## Hardware
//!
//! Active-low momentary switch with the internal pull-up enabled.  The
//! button task samples the level every few milliseconds and feeds it to
//! [`ButtonDriver::tick`].
//!
//! ## Gestures
//!
//! | Gesture     | Condition                      | Event        | Action      |
//! |-------------|--------------------------------|--------------|-------------|
//! | Short press | Release after debounce, < 2 s  | `ShortPress` | none        |
//! | Long press  | Hold >= 2 s                    | `LongPress`  | bus rearm   |

const DEBOUNCE_MS: u32 = 50;
const LONG_PRESS_MS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    Debounce { since_ms: u32 },
    Pressed { since_ms: u32 },
    /// Long press already reported; wait for release.
    Latched,
}

pub struct ButtonDriver {
    gpio: i32,
    state: GestureState,
}

impl ButtonDriver {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            state: GestureState::Idle,
        }
    }

    /// GPIO pin this button is attached to.
    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Sample the pin and advance the gesture machine.
    pub fn poll(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let pressed = !crate::drivers::hw_init::gpio_read(self.gpio);
        self.tick(now_ms, pressed)
    }

    /// Advance the gesture machine with an explicit level sample.
    pub fn tick(&mut self, now_ms: u32, pressed: bool) -> Option<ButtonEvent> {
        match self.state {
            GestureState::Idle => {
                if pressed {
                    self.state = GestureState::Debounce { since_ms: now_ms };
                }
                None
            }

            GestureState::Debounce { since_ms } => {
                if !pressed {
                    self.state = GestureState::Idle;
                } else if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = GestureState::Pressed { since_ms };
                }
                None
            }

            GestureState::Pressed { since_ms } => {
                if !pressed {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::ShortPress);
                }
                if now_ms.wrapping_sub(since_ms) >= LONG_PRESS_MS {
                    self.state = GestureState::Latched;
                    return Some(ButtonEvent::LongPress);
                }
                None
            }

            GestureState::Latched => {
                if !pressed {
                    self.state = GestureState::Idle;
                }
                None
            }
        }
    }
}
