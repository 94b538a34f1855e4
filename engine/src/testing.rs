//! In-memory stand-in for the device, used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::device::{DeviceApi, ProcessingResult, ProgressFn, StorageStatus, UploadFile};
use crate::error::DeviceError;
use crate::registry::ChannelAssignment;

#[derive(Default)]
pub struct FakeDevice {
    pub listing: Mutex<Vec<String>>,
    pub storage: Mutex<StorageStatus>,
    pub frequency: Mutex<Option<u32>>,
    /// Endpoints that answer with HTTP 500.
    pub failing: Mutex<HashSet<&'static str>>,
    /// Uploads of these names fail.
    pub failing_uploads: Mutex<HashSet<String>>,
    pub upload_delays: Mutex<HashMap<String, Duration>>,
    /// Per-endpoint answer delays.
    pub delays: Mutex<HashMap<&'static str, Duration>>,
    /// Endpoints that cannot be reached at all (transport error).
    pub offline: Mutex<HashSet<&'static str>>,
    /// Body sent with a failing `/setFrequency`.
    pub frequency_error: Mutex<Option<String>>,
    calls: Mutex<Vec<&'static str>>,
    pub submitted: Mutex<Vec<Vec<ChannelAssignment>>>,
    pub uploaded: Mutex<Vec<String>>,
    pub frequency_posts: Mutex<Vec<u32>>,
}

impl FakeDevice {
    pub fn with_files(names: &[&str]) -> Self {
        let dev = Self::default();
        *dev.listing.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
        *dev.frequency.lock().unwrap() = Some(100);
        dev
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().remove(endpoint);
    }

    pub fn fail_upload(&self, name: &str) {
        self.failing_uploads.lock().unwrap().insert(name.to_string());
    }

    pub fn delay_upload(&self, name: &str, delay: Duration) {
        self.upload_delays.lock().unwrap().insert(name.to_string(), delay);
    }

    pub fn delay(&self, endpoint: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(endpoint, delay);
    }

    pub fn unplug(&self, endpoint: &'static str) {
        self.offline.lock().unwrap().insert(endpoint);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == endpoint).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, endpoint: &'static str) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(endpoint);
        let delay = self.delays.lock().unwrap().get(endpoint).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.lock().unwrap().contains(endpoint) {
            // A request that never left the client: the closest real
            // `reqwest::Error` that can be built without a network.
            let err = reqwest::Client::new()
                .get("not a url")
                .build()
                .expect_err("relative url must not build");
            return Err(DeviceError::transport(endpoint, err));
        }
        if self.failing.lock().unwrap().contains(endpoint) {
            return Err(DeviceError::status(endpoint, 500, "device error"));
        }
        Ok(())
    }
}

impl DeviceApi for FakeDevice {
    async fn list_files(&self) -> Result<Vec<String>, DeviceError> {
        self.enter("/getFiles").await?;
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn storage(&self) -> Result<StorageStatus, DeviceError> {
        self.enter("/storage").await?;
        Ok(*self.storage.lock().unwrap())
    }

    async fn upload(&self, file: UploadFile, progress: ProgressFn) -> Result<(), DeviceError> {
        self.enter("/upload").await?;
        let total = file.data.len() as u64;
        progress(total / 2, total);

        let delay = self.upload_delays.lock().unwrap().get(&file.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_uploads.lock().unwrap().contains(&file.name) {
            return Err(DeviceError::status("/upload", 500, "write failed"));
        }
        progress(total, total);
        self.uploaded.lock().unwrap().push(file.name.clone());
        self.listing.lock().unwrap().push(file.name);
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<(), DeviceError> {
        self.enter("/delete").await?;
        self.listing.lock().unwrap().retain(|n| n != name);
        Ok(())
    }

    async fn reset_channels(&self) -> Result<(), DeviceError> {
        self.enter("/resetChannels").await
    }

    async fn process_files(
        &self,
        selection: &[ChannelAssignment],
    ) -> Result<Vec<ProcessingResult>, DeviceError> {
        self.enter("/processFiles").await?;
        self.submitted.lock().unwrap().push(selection.to_vec());
        Ok(selection
            .iter()
            .map(|a| ProcessingResult {
                filename: a.name.clone(),
                channel: a.channel,
                numbers: Some(vec![1.0, 2.5]),
                number_count: Some(2),
                error: None,
                self_check: Some("OK".into()),
            })
            .collect())
    }

    async fn play(&self) -> Result<String, DeviceError> {
        self.enter("/play").await?;
        Ok("Wiedergabe gestartet".into())
    }

    async fn get_frequency(&self) -> Result<Option<u32>, DeviceError> {
        self.enter("/getFrequency").await?;
        Ok(*self.frequency.lock().unwrap())
    }

    async fn set_frequency(&self, hz: u32) -> Result<String, DeviceError> {
        self.enter("/setFrequency").await?;
        self.frequency_posts.lock().unwrap().push(hz);
        if let Some(body) = self.frequency_error.lock().unwrap().clone() {
            return Err(DeviceError::status("/setFrequency", 400, body));
        }
        *self.frequency.lock().unwrap() = Some(hz);
        Ok("OK".into())
    }
}
