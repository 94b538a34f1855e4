// --- Panel controller ----------------------------------------------------
//
// `Panel` owns every piece of operator-facing state and is the only thing that
// mutates it. It is cheap to clone (shared handles) so axum handlers and
// background tasks each hold their own copy.
//
// Locking rule: the state lock is never held across a device round trip. Each
// operation takes what it needs, releases the lock, awaits the device, then
// re-acquires the lock and re-checks that what it is about to touch is still
// there (the file may have been deleted, the list reloaded, the popup replaced).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::device::{DeviceApi, ProcessingResult, UploadFile};
use crate::error::{DeviceError, PanelError, PanelResult};
use crate::frequency::{self, FrequencyWidget};
use crate::registry::{Channel, ChannelAssignment, FileRegistry, StagedFile};
use crate::reorder::{DragSession, ItemBox, RowLayout};
use crate::storage;
use crate::upload::{self, BatchReport, UploadBatch, UploadBoard, UploadMode};
use crate::workflow::{Phase, StatusPopup, Tone, Workflow};

/// How long the playback popup stays up after the device answered.
pub const STATUS_LINGER: Duration = Duration::from_secs(3);
/// Delay between a successful frequency save and the popup closing itself.
pub const FREQUENCY_CLOSE_DELAY: Duration = Duration::from_secs(1);

pub const MSG_FREQUENCY_UNREADABLE: &str = "Could not read the current frequency.";

#[derive(Debug, Default)]
pub struct PanelState {
    pub registry: FileRegistry,
    pub workflow: Workflow,
    pub drag: Option<DragSession>,
    pub frequency: FrequencyWidget,
    pub storage_line: String,
}

impl PanelState {
    /// Replace the file list and forget everything derived from the old one.
    fn rebuild_registry(&mut self, names: Vec<String>) {
        self.registry.replace_from_listing(names);
        self.workflow.invalidate();
        self.drag = None;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub files: Vec<StagedFile>,
    pub phase: Phase,
    pub processing_complete: bool,
    pub results: Vec<ProcessingResult>,
    pub status: Option<StatusPopup>,
    pub upload: Option<UploadBatch>,
    pub drag_order: Option<Vec<String>>,
    pub frequency: FrequencyWidget,
    pub storage: String,
}

pub struct Panel<D> {
    device: Arc<D>,
    state: Arc<RwLock<PanelState>>,
    uploads: UploadBoard,
}

impl<D> Clone for Panel<D> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            state: self.state.clone(),
            uploads: self.uploads.clone(),
        }
    }
}

impl<D: DeviceApi> Panel<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            state: Arc::new(RwLock::new(PanelState::default())),
            uploads: UploadBoard::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn state(&self) -> &Arc<RwLock<PanelState>> {
        &self.state
    }

    /// First load plus the background storage poll. A device that is not
    /// reachable yet is not fatal: the operator can reload later.
    pub async fn initialize(&self) -> JoinHandle<()> {
        match self.load().await {
            Ok(n) => info!("panel ready, {n} file(s) on device"),
            Err(e) => warn!("initial file listing failed: {e}"),
        }
        tokio::spawn(storage::storage_tick(self.clone()))
    }

    pub async fn snapshot(&self) -> PanelSnapshot {
        let st = self.state.read().await;
        PanelSnapshot {
            files: st.registry.files().to_vec(),
            phase: st.workflow.phase(),
            processing_complete: st.workflow.processing_complete(),
            results: st.workflow.results().to_vec(),
            status: st.workflow.status().cloned(),
            upload: self.uploads.snapshot(),
            drag_order: st.drag.as_ref().map(|d| d.order().to_vec()),
            frequency: st.frequency.clone(),
            storage: st.storage_line.clone(),
        }
    }

    // --- registry -------------------------------------------------------

    /// Fetch the device listing and rebuild the registry from it. Returns the
    /// number of staged files.
    pub async fn load(&self) -> PanelResult<usize> {
        let names = self.device.list_files().await.map_err(|e| {
            warn!("file listing failed: {e}");
            PanelError::from(e)
        })?;
        let mut st = self.state.write().await;
        st.rebuild_registry(names);
        Ok(st.registry.len())
    }

    pub async fn set_selected(&self, name: &str, selected: bool) -> bool {
        self.state.write().await.registry.set_selected(name, selected)
    }

    pub async fn set_channel(&self, name: &str, channel: Channel) -> bool {
        self.state.write().await.registry.set_channel(name, channel)
    }

    pub async fn reorder(&self, order: &[String]) -> Vec<String> {
        let mut st = self.state.write().await;
        st.registry.reorder(order);
        st.registry.names()
    }

    /// Delete on the device, then drop the entry. Results computed before the
    /// delete are void as soon as it is requested.
    pub async fn remove(&self, name: &str) -> PanelResult<()> {
        {
            let mut st = self.state.write().await;
            if !st.registry.contains(name) {
                return Err(PanelError::rejected(format!("Unknown file: {name}")));
            }
            st.workflow.invalidate();
        }

        if let Err(e) = self.device.delete_file(name).await {
            warn!("delete {name} failed: {e}");
            return Err(e.into());
        }

        let mut st = self.state.write().await;
        st.registry.remove_entry(name);
        st.workflow.invalidate();
        info!("deleted {name}");
        Ok(())
    }

    // --- drag and drop --------------------------------------------------

    pub async fn begin_drag(&self, name: &str, layout: RowLayout) -> PanelResult<Vec<String>> {
        let mut st = self.state.write().await;
        let session = DragSession::begin(st.registry.names(), name, layout)
            .ok_or_else(|| PanelError::rejected(format!("Unknown file: {name}")))?;
        let order = session.order().to_vec();
        st.drag = Some(session);
        Ok(order)
    }

    /// Pointer moved. `boxes` are measured row bounds if the caller has them;
    /// otherwise the session's row layout is used.
    pub async fn drag_over(&self, pointer_y: f64, boxes: Option<&[ItemBox]>) -> PanelResult<Vec<String>> {
        let mut st = self.state.write().await;
        let session = st
            .drag
            .as_mut()
            .ok_or_else(|| PanelError::rejected("No drag in progress."))?;
        match boxes {
            Some(boxes) => session.drag_over_boxes(pointer_y, boxes),
            None => session.drag_over(pointer_y),
        }
        Ok(session.order().to_vec())
    }

    /// Drop: commit the dragged order to the registry.
    pub async fn end_drag(&self) -> PanelResult<Vec<String>> {
        let mut st = self.state.write().await;
        let session = st
            .drag
            .take()
            .ok_or_else(|| PanelError::rejected("No drag in progress."))?;
        st.registry.reorder(&session.finish());
        Ok(st.registry.names())
    }

    // --- uploads --------------------------------------------------------

    /// Start a batch in the background and return its id right away. Progress
    /// shows up in snapshots.
    pub fn start_upload(&self, files: Vec<UploadFile>, mode: UploadMode) -> Uuid {
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let batch = self.uploads.start(mode, &names);
        let panel = self.clone();
        tokio::spawn(async move {
            panel.drive_upload(batch, mode, files).await;
        });
        batch
    }

    /// Run a batch to the end, including the refresh it asks for.
    pub async fn upload(&self, files: Vec<UploadFile>, mode: UploadMode) -> BatchReport {
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let batch = self.uploads.start(mode, &names);
        self.drive_upload(batch, mode, files).await
    }

    async fn drive_upload(&self, batch: Uuid, mode: UploadMode, files: Vec<UploadFile>) -> BatchReport {
        info!("upload batch {batch}: {} file(s), {mode:?}", files.len());
        let report = upload::run_batch(self.device.as_ref(), &self.uploads, batch, mode, files).await;
        if report.refresh {
            if let Err(e) = self.load().await {
                warn!("refresh after upload batch {batch} failed: {e}");
            }
        }
        report
    }

    pub fn upload_status(&self) -> Option<UploadBatch> {
        self.uploads.snapshot()
    }

    // --- processing and playback ----------------------------------------

    /// Reset the device's channel data, then submit the selected files in
    /// registry order.
    ///
    /// The round trips run on their own task. A caller that goes away early
    /// (client disconnect) does not strand the workflow in `Processing`.
    pub async fn process(&self) -> PanelResult<Vec<ProcessingResult>> {
        let selection = {
            let mut st = self.state.write().await;
            let selection = st.registry.selection();
            let generation = st.registry.generation();
            st.workflow.begin_processing(selection.len(), generation)?;
            selection
        };
        info!("processing {} file(s)", selection.len());

        let panel = self.clone();
        tokio::spawn(async move { panel.run_processing(selection).await }).await?
    }

    async fn run_processing(&self, selection: Vec<ChannelAssignment>) -> PanelResult<Vec<ProcessingResult>> {
        let outcome: Result<Vec<ProcessingResult>, DeviceError> = async {
            self.device.reset_channels().await?;
            self.device.process_files(&selection).await
        }
        .await;

        let mut st = self.state.write().await;
        match outcome {
            Ok(results) => {
                let generation = st.registry.generation();
                if !st.workflow.finish_processing(results.clone(), generation) {
                    warn!("file list changed while processing; run again before playback");
                }
                Ok(results)
            }
            Err(e) => {
                warn!("processing failed: {e}");
                st.workflow.fail_processing();
                Err(e.into())
            }
        }
    }

    /// Start playback if the last processing run is still valid. Like
    /// `process`, the device call and its popup timer outlive the caller.
    pub async fn play(&self) -> PanelResult<String> {
        self.state.write().await.workflow.begin_playback()?;

        let panel = self.clone();
        tokio::spawn(async move { panel.run_playback().await }).await?
    }

    async fn run_playback(&self) -> PanelResult<String> {
        let outcome = self.device.play().await;

        let token = {
            let mut st = self.state.write().await;
            match &outcome {
                Ok(text) => {
                    info!("playback started: {text}");
                    st.workflow.playback_started()
                }
                Err(e) => {
                    warn!("playback failed: {e}");
                    st.workflow.playback_failed()
                }
            }
        };
        self.dismiss_status_after(token, STATUS_LINGER);
        outcome.map_err(Into::into)
    }

    fn dismiss_status_after(&self, token: u64, delay: Duration) {
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.write().await.workflow.dismiss_status(token);
        });
    }

    // --- frequency ------------------------------------------------------

    /// Open the popup (fetching the current value) or close it if open.
    pub async fn toggle_frequency(&self) -> FrequencyWidget {
        let epoch = {
            let mut st = self.state.write().await;
            if st.frequency.open {
                st.frequency.close();
                return st.frequency.clone();
            }
            st.frequency.open();
            st.frequency.epoch()
        };

        let fetched = self.device.get_frequency().await;

        let mut st = self.state.write().await;
        if st.frequency.epoch() == epoch {
            match fetched {
                Ok(hz) => st.frequency.loaded(hz),
                Err(e) => {
                    warn!("reading frequency failed: {e}");
                    st.frequency.say(MSG_FREQUENCY_UNREADABLE, Tone::Error);
                }
            }
        }
        st.frequency.clone()
    }

    /// Validate and store a new frequency. On success the popup closes itself
    /// after `FREQUENCY_CLOSE_DELAY`.
    pub async fn save_frequency(&self, input: &str) -> PanelResult<u32> {
        let Some(hz) = frequency::parse_frequency(input) else {
            self.state
                .write()
                .await
                .frequency
                .say(frequency::MSG_INVALID, Tone::Error);
            return Err(PanelError::rejected(frequency::MSG_INVALID));
        };

        info!("setting frequency to {hz} Hz");
        match self.device.set_frequency(hz).await {
            Ok(_) => {
                let epoch = {
                    let mut st = self.state.write().await;
                    st.frequency.value = hz;
                    st.frequency.say(frequency::MSG_SAVED, Tone::Success);
                    st.frequency.epoch()
                };
                let state = self.state.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(FREQUENCY_CLOSE_DELAY).await;
                    state.write().await.frequency.close_if_epoch(epoch);
                });
                Ok(hz)
            }
            Err(e) => {
                warn!("saving frequency failed: {e}");
                let text = e
                    .device_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| frequency::MSG_SAVE_FAILED.to_string());
                self.state.write().await.frequency.say(text, Tone::Error);
                Err(e.into())
            }
        }
    }
}
