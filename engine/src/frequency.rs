// --- Output frequency setting --------------------------------------------
//
// The device plays processed values back at a configurable rate. The panel
// shows it in a small popup: opening fetches the current value, saving
// validates locally before anything goes over the wire.

use serde::Serialize;

use crate::workflow::Tone;

pub const MIN_HZ: u32 = 1;
pub const MAX_HZ: u32 = 1000;
/// Shown when the device does not report a value.
pub const DEFAULT_HZ: u32 = 100;

pub const MSG_INVALID: &str = "Enter a valid frequency (1-1000 Hz).";
pub const MSG_SAVED: &str = "Frequency saved!";
pub const MSG_SAVE_FAILED: &str = "Could not save the frequency!";

/// Parse operator input into a frequency in `[MIN_HZ, MAX_HZ]`.
///
/// The whole trimmed input must be an integer: `"250abc"` and `"12.5"` are
/// rejected rather than cut down to a leading number.
pub fn parse_frequency(input: &str) -> Option<u32> {
    let hz: i64 = input.trim().parse().ok()?;
    if (MIN_HZ as i64..=MAX_HZ as i64).contains(&hz) {
        Some(hz as u32)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetMessage {
    pub text: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrequencyWidget {
    pub open: bool,
    pub value: u32,
    pub message: Option<WidgetMessage>,
    // Incremented on every open/close so a delayed auto-close from an earlier
    // save can't shut a popup the operator reopened since.
    #[serde(skip)]
    epoch: u64,
}

impl Default for FrequencyWidget {
    fn default() -> Self {
        Self {
            open: false,
            value: DEFAULT_HZ,
            message: None,
            epoch: 0,
        }
    }
}

impl FrequencyWidget {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn open(&mut self) {
        self.open = true;
        self.message = None;
        self.epoch += 1;
    }

    /// Fill in the value fetched after opening.
    pub fn loaded(&mut self, hz: Option<u32>) {
        self.value = hz.unwrap_or(DEFAULT_HZ);
    }

    pub fn close(&mut self) {
        self.open = false;
        self.message = None;
        self.epoch += 1;
    }

    /// Close only if nothing reopened or closed the popup since `epoch`.
    pub fn close_if_epoch(&mut self, epoch: u64) -> bool {
        if self.open && self.epoch == epoch {
            self.close();
            return true;
        }
        false
    }

    pub fn say(&mut self, text: impl Into<String>, tone: Tone) {
        self.message = Some(WidgetMessage {
            text: text.into(),
            tone,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_inclusive_bounds() {
        assert_eq!(parse_frequency("1"), Some(1));
        assert_eq!(parse_frequency("1000"), Some(1000));
        assert_eq!(parse_frequency(" 250 "), Some(250));
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        for bad in ["0", "1001", "1500", "-5", "", "abc", "12.5", "250abc", "99999999999999999999"] {
            assert_eq!(parse_frequency(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn missing_value_defaults() {
        let mut w = FrequencyWidget::default();
        w.open();
        w.loaded(None);
        assert_eq!(w.value, DEFAULT_HZ);
        w.loaded(Some(40));
        assert_eq!(w.value, 40);
    }

    #[test]
    fn opening_clears_message() {
        let mut w = FrequencyWidget::default();
        w.open();
        w.say(MSG_INVALID, Tone::Error);
        w.close();
        assert!(w.message.is_none());
        w.open();
        assert!(w.message.is_none());
    }

    #[test]
    fn stale_auto_close_is_ignored() {
        let mut w = FrequencyWidget::default();
        w.open();
        let epoch = w.epoch();
        w.close();
        w.open();
        assert!(!w.close_if_epoch(epoch));
        assert!(w.open);
        assert!(w.close_if_epoch(w.epoch()));
        assert!(!w.open);
    }
}
