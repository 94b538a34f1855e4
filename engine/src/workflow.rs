// --- Processing / playback workflow --------------------------------------
//
//   Idle --process--> Processing --ok--> Ready --play--> Playing
//     ^                   |                ^               |
//     +------failed-------+                +--play failed--+
//
// `processing_complete` is the playback gate. It goes up only when a
// processing run returns successfully for the file set it was started with,
// and drops whenever that file set changes. The phase label is what the
// operator sees; the gate alone decides whether playback may be requested.
//
// This type holds state only. The panel performs the device round trips and
// drives the transitions around them.

use serde::{Deserialize, Serialize};

use crate::device::ProcessingResult;
use crate::error::{PanelError, PanelResult};

pub const MSG_NO_SELECTION: &str = "No files selected. Tick the files you want to process.";
pub const MSG_ALREADY_PROCESSING: &str = "Processing is already running.";
pub const MSG_PROCESS_FIRST: &str = "Run processing before starting playback.";
pub const MSG_PROCESSING: &str = "Processing files...";
pub const MSG_PLAY_STARTING: &str = "Starting playback...";
pub const MSG_PLAY_RUNNING: &str = "Playback running...";
pub const MSG_PLAY_FAILED: &str = "Playback could not be started!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Processing,
    Ready,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPopup {
    pub text: String,
    pub tone: Tone,
    #[serde(skip)]
    token: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Workflow {
    phase: Phase,
    processing_complete: bool,
    results: Vec<ProcessingResult>,
    status: Option<StatusPopup>,
    next_token: u64,
    // Registry generation captured when the current run started.
    run_generation: Option<u64>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn processing_complete(&self) -> bool {
        self.processing_complete
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn status(&self) -> Option<&StatusPopup> {
        self.status.as_ref()
    }

    /// Show a popup. The returned token dismisses exactly this popup.
    pub fn show_status(&mut self, text: impl Into<String>, tone: Tone) -> u64 {
        self.next_token += 1;
        self.status = Some(StatusPopup {
            text: text.into(),
            tone,
            token: self.next_token,
        });
        self.next_token
    }

    /// Hide the popup if it is still the one `token` was issued for.
    pub fn dismiss_status(&mut self, token: u64) -> bool {
        if self.status.as_ref().is_some_and(|s| s.token == token) {
            self.status = None;
            return true;
        }
        false
    }

    /// The file set changed; earlier results no longer describe it.
    pub fn invalidate(&mut self) {
        self.processing_complete = false;
    }

    /// Validate and enter `Processing`. `selected` is the number of selected
    /// files and `generation` the registry generation the run works against.
    pub fn begin_processing(&mut self, selected: usize, generation: u64) -> PanelResult<()> {
        if self.phase == Phase::Processing {
            return Err(PanelError::rejected(MSG_ALREADY_PROCESSING));
        }
        if selected == 0 {
            return Err(PanelError::rejected(MSG_NO_SELECTION));
        }
        self.phase = Phase::Processing;
        self.processing_complete = false;
        self.run_generation = Some(generation);
        self.show_status(MSG_PROCESSING, Tone::Info);
        Ok(())
    }

    /// Store results. The gate opens only if the file set is the one the run
    /// started with; returns whether it did.
    pub fn finish_processing(&mut self, results: Vec<ProcessingResult>, generation: u64) -> bool {
        let current = self.run_generation.take() == Some(generation);
        self.results = results;
        self.processing_complete = current;
        self.phase = if current { Phase::Ready } else { Phase::Idle };
        self.status = None;
        current
    }

    pub fn fail_processing(&mut self) {
        self.run_generation = None;
        self.processing_complete = false;
        self.phase = Phase::Idle;
        self.status = None;
    }

    /// Check the gate and show the "starting" popup.
    pub fn begin_playback(&mut self) -> PanelResult<()> {
        if !self.processing_complete {
            return Err(PanelError::rejected(MSG_PROCESS_FIRST));
        }
        self.show_status(MSG_PLAY_STARTING, Tone::Info);
        Ok(())
    }

    /// Returns the popup token to dismiss later.
    pub fn playback_started(&mut self) -> u64 {
        self.phase = Phase::Playing;
        self.show_status(MSG_PLAY_RUNNING, Tone::Success)
    }

    /// Back to `Ready`; returns the popup token to dismiss later.
    pub fn playback_failed(&mut self) -> u64 {
        if self.phase == Phase::Playing || self.processing_complete {
            self.phase = Phase::Ready;
        }
        self.show_status(MSG_PLAY_FAILED, Tone::Error)
    }
}
