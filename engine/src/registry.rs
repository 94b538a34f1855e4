// --- File registry -------------------------------------------------------
//
// The ordered list of files the operator is working with. Order matters: it is
// both the display order and the order files are submitted for processing.
//
// Entries are keyed by name. Every mutation is a point update by name (or a
// whole-list rebuild from a fresh device listing), so a completion that arrives
// after the entry was deleted or reloaded simply finds nothing and does nothing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reserved names the device keeps in the same flash filesystem as uploads.
/// They are never offered as processable files.
pub const EXCLUDED_FILES: [&str; 4] = [
    "HS-Wismar_Logo-FIW_V1_RGB.png",
    "script.js",
    "HTML_Server.html",
    "freq.cfg",
];

pub fn is_excluded(name: &str) -> bool {
    EXCLUDED_FILES.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Channel {
    #[default]
    #[serde(rename = "CH_A")]
    A,
    #[serde(rename = "CH_B")]
    B,
    #[serde(rename = "CH_C")]
    C,
    #[serde(rename = "CH_D")]
    D,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    pub fn label(self) -> &'static str {
        match self {
            Channel::A => "CH_A",
            Channel::B => "CH_B",
            Channel::C => "CH_C",
            Channel::D => "CH_D",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|ch| ch.label() == s.trim())
            .ok_or_else(|| format!("unknown channel: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub name: String,
    pub selected: bool,
    pub channel: Channel,
}

impl StagedFile {
    fn new(name: String) -> Self {
        Self {
            name,
            selected: false,
            channel: Channel::default(),
        }
    }
}

/// One line of the processing request: which file feeds which channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAssignment {
    pub name: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    files: Vec<StagedFile>,
    // Bumped whenever the *set* of files changes (rebuild or removal). A
    // processing run compares it before and after its round trips.
    generation: u64,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a device listing. Excluded names are skipped, duplicates
    /// collapse to their first occurrence, and all metadata resets to defaults.
    pub fn replace_from_listing<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        self.files = names
            .into_iter()
            .map(Into::into)
            .filter(|name| !is_excluded(name) && seen.insert(name.clone()))
            .map(StagedFile::new)
            .collect();
        self.generation += 1;
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&StagedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false if `name` is not in the registry.
    pub fn set_selected(&mut self, name: &str, selected: bool) -> bool {
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(f) => {
                f.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Returns false if `name` is not in the registry.
    pub fn set_channel(&mut self, name: &str, channel: Channel) -> bool {
        match self.files.iter_mut().find(|f| f.name == name) {
            Some(f) => {
                f.channel = channel;
                true
            }
            None => false,
        }
    }

    /// Drop an entry after the device confirmed the delete.
    pub fn remove_entry(&mut self, name: &str) -> Option<StagedFile> {
        let idx = self.files.iter().position(|f| f.name == name)?;
        self.generation += 1;
        Some(self.files.remove(idx))
    }

    /// Reorder to follow `order`.
    ///
    /// The result is always a permutation of the current entries: names in
    /// `order` that are unknown (or repeated) are skipped, and entries that
    /// `order` does not mention keep their relative order at the tail.
    pub fn reorder<S: AsRef<str>>(&mut self, order: &[S]) {
        let previous: Vec<String> = self.names();
        let mut by_name: HashMap<String, StagedFile> = self
            .files
            .drain(..)
            .map(|f| (f.name.clone(), f))
            .collect();

        let mut reordered = Vec::with_capacity(by_name.len());
        for name in order {
            if let Some(file) = by_name.remove(name.as_ref()) {
                reordered.push(file);
            }
        }
        for name in &previous {
            if let Some(file) = by_name.remove(name) {
                reordered.push(file);
            }
        }
        self.files = reordered;
    }

    /// Selected files in registry order, as the processing request expects them.
    pub fn selection(&self) -> Vec<ChannelAssignment> {
        self.files
            .iter()
            .filter(|f| f.selected)
            .map(|f| ChannelAssignment {
                name: f.name.clone(),
                channel: f.channel,
            })
            .collect()
    }
}
