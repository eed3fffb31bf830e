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
    io::{Read, Seek},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::buffer::{AudioBuffer, SampleEncoding};
use super::decoder::{self, DecodeLimits};
use super::error::DecodeError;
use super::Role;
use crate::util::filename_display;

/// Reports how much memory is left for audio buffers.
pub trait HeapMonitor: Send + Sync {
    fn free_bytes(&self) -> usize;

    /// Called after a buffer of `bytes` has been installed.
    fn allocated(&self, _bytes: usize) {}

    /// Called after the store dropped its reference to a buffer of `bytes`.
    fn released(&self, _bytes: usize) {}
}

/// A fixed heap budget that tracks the buffers resident in the store.
pub struct HeapBudget {
    capacity: usize,
    used: Mutex<usize>,
}

impl HeapBudget {
    pub fn new(capacity: usize) -> HeapBudget {
        HeapBudget {
            capacity,
            used: Mutex::new(0),
        }
    }

    pub fn used(&self) -> usize {
        *self.used.lock()
    }
}

impl HeapMonitor for HeapBudget {
    fn free_bytes(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    fn allocated(&self, bytes: usize) {
        *self.used.lock() += bytes;
    }

    fn released(&self, bytes: usize) {
        let mut used = self.used.lock();
        *used = used.saturating_sub(bytes);
    }
}

#[derive(Default)]
struct Slot {
    buffer: Option<Arc<AudioBuffer>>,
    path: Option<PathBuf>,
}

/// Owns the active downbeat and beat buffers.
///
/// A role is only replaced after the new clip decoded successfully, so a failed load
/// leaves the previous clip playable. Buffers are shared with the playback driver by
/// reference count: replacing a role while it plays lets the old clip finish and
/// frees it once the driver lets go.
pub struct AudioBufferStore {
    downbeat: Slot,
    beat: Slot,
    encoding: SampleEncoding,
    limits: DecodeLimits,
    heap: Arc<dyn HeapMonitor>,
}

impl AudioBufferStore {
    pub fn new(
        encoding: SampleEncoding,
        limits: DecodeLimits,
        heap: Arc<dyn HeapMonitor>,
    ) -> AudioBufferStore {
        AudioBufferStore {
            downbeat: Slot::default(),
            beat: Slot::default(),
            encoding,
            limits,
            heap,
        }
    }

    fn slot(&self, role: Role) -> &Slot {
        match role {
            Role::Downbeat => &self.downbeat,
            Role::Beat => &self.beat,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Slot {
        match role {
            Role::Downbeat => &mut self.downbeat,
            Role::Beat => &mut self.beat,
        }
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Decodes the file at `path` and makes it the active clip for `role`.
    pub fn load_into(&mut self, role: Role, path: &Path) -> Result<(), DecodeError> {
        let buffer = self.decode_detached(path).inspect_err(|e| {
            warn!(
                %role,
                file = filename_display(path),
                err = %e,
                "Unable to load sound, keeping the previous one"
            );
        })?;
        self.install(role, buffer, Some(path.to_path_buf()));
        Ok(())
    }

    /// Decodes a WAV stream and makes it the active clip for `role`.
    pub fn load_from_reader<R: Read + Seek>(
        &mut self,
        role: Role,
        reader: &mut R,
    ) -> Result<(), DecodeError> {
        let buffer = decoder::decode(reader, self.encoding, &self.limits, self.heap.free_bytes())
            .inspect_err(|e| warn!(%role, err = %e, "Unable to load sound"))?;
        self.install(role, Arc::new(buffer), None);
        Ok(())
    }

    /// Decodes a clip without installing it, e.g. to preview a sound set.
    pub fn decode_detached(&self, path: &Path) -> Result<Arc<AudioBuffer>, DecodeError> {
        let buffer =
            decoder::decode_file(path, self.encoding, &self.limits, self.heap.free_bytes())?;
        Ok(Arc::new(buffer))
    }

    fn install(&mut self, role: Role, buffer: Arc<AudioBuffer>, path: Option<PathBuf>) {
        let bytes = buffer.len();
        info!(
            %role,
            file = path.as_deref().map(filename_display),
            bytes,
            sample_rate = buffer.sample_rate(),
            channels = buffer.channels(),
            "Loaded sound"
        );
        self.heap.allocated(bytes);
        let slot = self.slot_mut(role);
        let previous = slot.buffer.replace(buffer);
        slot.path = path;
        if let Some(previous) = previous {
            self.heap.released(previous.len());
        }
    }

    /// The clip currently active for `role`.
    pub fn active_buffer(&self, role: Role) -> Option<Arc<AudioBuffer>> {
        self.slot(role).buffer.clone()
    }

    /// The file the active clip for `role` came from.
    pub fn path(&self, role: Role) -> Option<&Path> {
        self.slot(role).path.as_deref()
    }

    /// True once both roles have a clip.
    pub fn are_loaded(&self) -> bool {
        self.downbeat.buffer.is_some() && self.beat.buffer.is_some()
    }

    /// Bytes held by the active clips.
    pub fn resident_bytes(&self) -> usize {
        [&self.downbeat, &self.beat]
            .iter()
            .filter_map(|slot| slot.buffer.as_ref())
            .map(|buffer| buffer.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testutil::WavBuilder;

    fn store(encoding: SampleEncoding, capacity: usize) -> (AudioBufferStore, Arc<HeapBudget>) {
        let heap = Arc::new(HeapBudget::new(capacity));
        let limits = DecodeLimits {
            safety_margin: 0,
            ..DecodeLimits::default()
        };
        (AudioBufferStore::new(encoding, limits, heap.clone()), heap)
    }

    #[test]
    fn test_load_both_roles() {
        let dir = tempfile::tempdir().unwrap();
        let downbeat = dir.path().join("Metro_Downbeat.wav");
        let beat = dir.path().join("Metro_Beat.wav");
        WavBuilder::pcm(1, 22050, 16)
            .samples_i16(&[0x1000; 100])
            .write_to(&downbeat)
            .unwrap();
        WavBuilder::pcm(1, 22050, 8)
            .data(vec![200; 50])
            .write_to(&beat)
            .unwrap();

        let (mut store, heap) = store(SampleEncoding::Unsigned8, 100_000);
        assert!(!store.are_loaded());

        store.load_into(Role::Downbeat, &downbeat).unwrap();
        assert!(!store.are_loaded());
        store.load_into(Role::Beat, &beat).unwrap();
        assert!(store.are_loaded());

        let buffer = store.active_buffer(Role::Downbeat).unwrap();
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.bytes()[0], 0x10 + 128);
        assert_eq!(store.active_buffer(Role::Beat).unwrap().bytes(), &[200; 50][..]);
        assert_eq!(store.path(Role::Beat), Some(beat.as_path()));
        assert_eq!(store.resident_bytes(), 150);
        assert_eq!(heap.used(), 150);
    }

    #[test]
    fn test_failed_load_keeps_previous_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        let bad = dir.path().join("bad.wav");
        WavBuilder::pcm(1, 22050, 16)
            .samples_i16(&[100; 64])
            .write_to(&good)
            .unwrap();
        WavBuilder::pcm(1, 22050, 16)
            .codec(3)
            .samples_i16(&[100; 64])
            .write_to(&bad)
            .unwrap();

        let (mut store, _) = store(SampleEncoding::Signed16, 100_000);
        store.load_into(Role::Beat, &good).unwrap();
        let before = store.active_buffer(Role::Beat).unwrap();

        assert!(matches!(
            store.load_into(Role::Beat, &bad),
            Err(DecodeError::Format(_))
        ));
        assert!(matches!(
            store.load_into(Role::Beat, &dir.path().join("missing.wav")),
            Err(DecodeError::Io(_))
        ));

        let after = store.active_buffer(Role::Beat).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(store.path(Role::Beat), Some(good.as_path()));
    }

    #[test]
    fn test_out_of_memory_keeps_previous_buffer() {
        let (mut store, heap) = store(SampleEncoding::Signed16, 300);
        let small = WavBuilder::pcm(1, 22050, 16).samples_i16(&[1; 100]).build();
        let large = WavBuilder::pcm(1, 22050, 16).samples_i16(&[2; 100]).build();

        store
            .load_from_reader(Role::Downbeat, &mut Cursor::new(small))
            .unwrap();
        assert_eq!(heap.free_bytes(), 100);

        // The old buffer still counts against the budget while the new one decodes.
        assert!(matches!(
            store.load_from_reader(Role::Downbeat, &mut Cursor::new(large)),
            Err(DecodeError::OutOfMemory {
                required: 200,
                available: 100
            })
        ));
        assert_eq!(store.active_buffer(Role::Downbeat).unwrap().sample_i16(0), Some(1));
    }

    #[test]
    fn test_replacing_releases_budget() {
        let (mut store, heap) = store(SampleEncoding::Unsigned8, 1_000);
        let first = WavBuilder::pcm(1, 22050, 8).data(vec![1; 300]).build();
        let second = WavBuilder::pcm(1, 22050, 8).data(vec![2; 100]).build();

        store
            .load_from_reader(Role::Beat, &mut Cursor::new(first))
            .unwrap();
        let held = store.active_buffer(Role::Beat).unwrap();
        store
            .load_from_reader(Role::Beat, &mut Cursor::new(second))
            .unwrap();

        assert_eq!(heap.used(), 100);
        assert_eq!(store.path(Role::Beat), None);
        // Whoever still holds the old clip can keep reading it.
        assert_eq!(held.bytes()[0], 1);
        assert_eq!(store.active_buffer(Role::Beat).unwrap().bytes()[0], 2);
    }

    #[test]
    fn test_budget_accounting() {
        let budget = HeapBudget::new(500);
        budget.allocated(200);
        budget.allocated(100);
        assert_eq!(budget.used(), 300);
        assert_eq!(budget.free_bytes(), 200);

        budget.released(100);
        assert_eq!(budget.free_bytes(), 300);

        // Releasing more than is held bottoms out at zero.
        budget.released(1_000);
        assert_eq!(budget.used(), 0);
        assert_eq!(budget.free_bytes(), 500);
    }
}
