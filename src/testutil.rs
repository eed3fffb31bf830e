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
    error::Error,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, SystemTime},
};

use crate::clock::Clock;

/// Builds byte-exact WAV streams, including ones a regular writer refuses to produce
/// (foreign codec tags, junk chunks, odd chunk sizes).
pub struct WavBuilder {
    riff: [u8; 4],
    wave: [u8; 4],
    codec: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    fmt_extra: Vec<u8>,
    before: Vec<([u8; 4], Vec<u8>)>,
    after: Vec<([u8; 4], Vec<u8>)>,
    data: Option<Vec<u8>>,
}

impl WavBuilder {
    /// Starts a linear PCM stream with no samples.
    pub fn pcm(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        WavBuilder {
            riff: *b"RIFF",
            wave: *b"WAVE",
            codec: 1,
            channels,
            sample_rate,
            bits_per_sample,
            fmt_extra: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            data: Some(Vec::new()),
        }
    }

    pub fn codec(mut self, codec: u16) -> Self {
        self.codec = codec;
        self
    }

    pub fn signature(mut self, riff: [u8; 4], wave: [u8; 4]) -> Self {
        self.riff = riff;
        self.wave = wave;
        self
    }

    pub fn fmt_extra(mut self, extra: Vec<u8>) -> Self {
        self.fmt_extra = extra;
        self
    }

    /// Adds a chunk between the format and data chunks.
    pub fn chunk_before(mut self, id: [u8; 4], payload: Vec<u8>) -> Self {
        self.before.push((id, payload));
        self
    }

    /// Adds a chunk after the data chunk.
    pub fn chunk_after(mut self, id: [u8; 4], payload: Vec<u8>) -> Self {
        self.after.push((id, payload));
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn without_data(mut self) -> Self {
        self.data = None;
        self
    }

    pub fn samples_i16(self, samples: &[i16]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.data(data)
    }

    pub fn samples_i24(self, samples: &[i32]) -> Self {
        let data = samples
            .iter()
            .flat_map(|s| {
                let b = s.to_le_bytes();
                [b[0], b[1], b[2]]
            })
            .collect();
        self.data(data)
    }

    fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
        out.extend_from_slice(id);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let block_align = self.channels * self.bits_per_sample.div_ceil(8);
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&self.codec.to_le_bytes());
        fmt.extend_from_slice(&self.channels.to_le_bytes());
        fmt.extend_from_slice(&self.sample_rate.to_le_bytes());
        fmt.extend_from_slice(&(self.sample_rate * u32::from(block_align)).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&self.bits_per_sample.to_le_bytes());
        fmt.extend_from_slice(&self.fmt_extra);

        let mut body = Vec::new();
        body.extend_from_slice(&self.wave);
        Self::push_chunk(&mut body, b"fmt ", &fmt);
        for (id, payload) in &self.before {
            Self::push_chunk(&mut body, id, payload);
        }
        if let Some(data) = &self.data {
            Self::push_chunk(&mut body, b"data", data);
        }
        for (id, payload) in &self.after {
            Self::push_chunk(&mut body, id, payload);
        }

        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&self.riff);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        fs::write(path, self.build())?;
        Ok(())
    }
}

/// Writes a short 16-bit mono sound set (`<name>_Downbeat.wav` and `<name>_Beat.wav`)
/// into the given directory.
pub fn write_sound_set(dir: &Path, name: &str, frames: usize) -> Result<(), Box<dyn Error>> {
    WavBuilder::pcm(1, 22050, 16)
        .samples_i16(&vec![12000; frames])
        .write_to(&dir.join(format!("{}_Downbeat.wav", name)))?;
    WavBuilder::pcm(1, 22050, 16)
        .samples_i16(&vec![-12000; frames])
        .write_to(&dir.join(format!("{}_Beat.wav", name)))?;
    Ok(())
}

/// A clock that only moves when told to.
#[derive(Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}
