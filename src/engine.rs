// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, span, warn, Level};

use crate::audio::{
    self,
    decoder::DecodeLimits,
    store::{HeapBudget, HeapMonitor},
    AudioBufferStore, DecodeError, OutputError, PlaybackDriver, PlaybackError, Role,
    SampleEncoding,
};
use crate::config::{self, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No output peripheral could be opened. The only fatal engine error.
    #[error("No output device: {0}")]
    NoOutputDevice(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// The audio engine the UI talks to: two sound roles, a volume and a playback driver.
pub struct AudioEngine {
    store: AudioBufferStore,
    driver: Box<dyn PlaybackDriver>,
    sound_dir: PathBuf,
}

impl AudioEngine {
    /// Creates an engine around an already opened driver. The store decodes into
    /// whatever representation the driver plays.
    pub fn new(
        driver: Box<dyn PlaybackDriver>,
        sound_dir: impl Into<PathBuf>,
        limits: DecodeLimits,
        heap: Arc<dyn HeapMonitor>,
    ) -> AudioEngine {
        AudioEngine {
            store: AudioBufferStore::new(driver.encoding(), limits, heap),
            driver,
            sound_dir: sound_dir.into(),
        }
    }

    /// Opens the configured output and builds the engine. No sounds are loaded yet.
    pub fn from_config(config: &config::Engine) -> Result<AudioEngine, EngineError> {
        let mut driver = audio::get_driver(config)?;
        driver.set_volume(config.volume());
        info!(
            output = ?config.output(),
            encoding = %driver.encoding(),
            volume = config.volume(),
            "Audio engine ready"
        );
        Ok(AudioEngine::new(
            driver,
            config.sound_dir(),
            config.decode_limits(),
            Arc::new(HeapBudget::new(config.heap_budget())),
        ))
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.driver.encoding()
    }

    pub fn store(&self) -> &AudioBufferStore {
        &self.store
    }

    pub fn sound_dir(&self) -> &Path {
        &self.sound_dir
    }

    /// The file a sound set uses for `role`, e.g. `<sound_dir>/Metro_Beat.wav`.
    pub fn sound_set_path(&self, set: &str, role: Role) -> PathBuf {
        self.sound_dir.join(format!("{}{}", set, role.file_suffix()))
    }

    /// Loads a clip for `role`. On failure the previous clip stays active.
    ///
    /// Reloading a role that is still playing is allowed: the clip in flight
    /// finishes from the old buffer.
    pub fn load_sound(&mut self, role: Role, path: &Path) -> Result<(), DecodeError> {
        self.store.load_into(role, path)
    }

    /// Loads one role from a named sound set.
    pub fn select_sound(&mut self, role: Role, set: &str) -> Result<(), DecodeError> {
        let path = self.sound_set_path(set, role);
        self.load_sound(role, &path)
    }

    /// Loads both roles from a named sound set. Both loads are attempted; returns
    /// true only if both succeeded.
    pub fn select_sound_set(&mut self, set: &str) -> bool {
        let span = span!(Level::INFO, "select sound set");
        let _enter = span.enter();

        let downbeat = self.select_sound(Role::Downbeat, set).is_ok();
        let beat = self.select_sound(Role::Beat, set).is_ok();
        if downbeat && beat {
            info!(set, "Sound set selected");
        }
        downbeat && beat
    }

    /// Plays the beat clip of a sound set without making it active.
    pub fn preview_sound_set(&mut self, set: &str) -> Result<(), EngineError> {
        let path = self.sound_set_path(set, Role::Beat);
        let buffer = self.store.decode_detached(&path)?;
        debug!(set, bytes = buffer.len(), "Previewing sound set");
        self.driver.play(&buffer)?;
        Ok(())
    }

    pub fn are_sounds_loaded(&self) -> bool {
        self.store.are_loaded()
    }

    /// The file each role was loaded from.
    pub fn sound_path(&self, role: Role) -> Option<&Path> {
        self.store.path(role)
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.driver.set_volume(volume);
    }

    pub fn volume(&self) -> u8 {
        self.driver.volume()
    }

    /// Plays the active clip for `role`. Does nothing if the role has no clip.
    /// Playback errors are logged, never raised to the beat loop.
    pub fn play(&mut self, role: Role) {
        let Some(buffer) = self.store.active_buffer(role) else {
            debug!(%role, "No sound loaded");
            return;
        };
        if let Err(e) = self.driver.play(&buffer) {
            warn!(%role, err = %e, "Unable to play sound");
        }
    }

    pub fn play_downbeat(&mut self) {
        self.play(Role::Downbeat);
    }

    pub fn play_beat(&mut self) {
        self.play(Role::Beat);
    }

    /// True while the driver is still pushing a clip out.
    pub fn is_clip_playing(&self) -> bool {
        self.driver.is_playing()
    }
}
