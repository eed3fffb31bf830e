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

//! Host output through cpal. Both output peripherals are emulated on top of one
//! stream: a DAC level that the stream samples and holds, and a bounded queue of
//! samples that takes priority over the DAC level when it has data.

use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, Level};

use super::buffer::U8_CENTER;
use super::chunked::BulkOutput;
use super::error::OutputError;
use super::interrupt::DacOutput;

/// An open output stream on the default host device.
pub struct CpalOutput {
    queue: Sender<i16>,
    level: Arc<AtomicU8>,
    channels: u16,
    sample_rate: u32,
    /// Dropping the last clone stops the stream thread.
    _keepalive: Arc<Sender<()>>,
}

impl CpalOutput {
    /// Opens the default output device. `queue_len` is the number of samples the
    /// bulk queue holds before writers block.
    pub fn open(queue_len: usize) -> Result<CpalOutput, OutputError> {
        let (queue_tx, queue_rx) = crossbeam_channel::bounded::<i16>(queue_len.max(1));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(u16, u32), String>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let level = Arc::new(AtomicU8::new(U8_CENTER));

        // cpal streams are not Send, so the stream lives and dies on its own thread.
        let stream_level = level.clone();
        thread::spawn(move || {
            let span = span!(Level::INFO, "cpal output");
            let _enter = span.enter();

            let stream = match open_stream(queue_rx, stream_level) {
                Ok((stream, channels, sample_rate)) => {
                    let _ = ready_tx.send(Ok((channels, sample_rate)));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Blocks until every handle is gone.
            let _ = stop_rx.recv();
            drop(stream);
            info!("Output stream closed");
        });

        let (channels, sample_rate) = ready_rx
            .recv()
            .map_err(|_| OutputError::Disconnected)?
            .map_err(OutputError::Device)?;

        Ok(CpalOutput {
            queue: queue_tx,
            level,
            channels,
            sample_rate,
            _keepalive: Arc::new(stop_tx),
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// A bulk transfer view of the stream.
    pub fn bulk(&self) -> CpalBulkOutput {
        CpalBulkOutput {
            queue: self.queue.clone(),
            device_rate: self.sample_rate,
            phase: 0,
            _keepalive: self._keepalive.clone(),
        }
    }

    /// A single sample DAC view of the stream.
    pub fn dac(&self) -> CpalDac {
        CpalDac {
            level: self.level.clone(),
            _keepalive: self._keepalive.clone(),
        }
    }
}

fn open_stream(
    queue: Receiver<i16>,
    level: Arc<AtomicU8>,
) -> Result<(cpal::Stream, u16, u32), String> {
    let device = {
        // Suppress noisy output from the host backends.
        let _shh_stdout = shh::stdout().ok();
        let _shh_stderr = shh::stderr().ok();
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| "no default output device".to_string())?
    };
    let supported = device
        .default_output_config()
        .map_err(|e| e.to_string())?;
    let sample_format = supported.sample_format();
    let config = supported.config();
    let channels = config.channels;
    let sample_rate: cpal::SampleRate = supported.sample_rate();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, queue, level),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, queue, level),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, queue, level),
        other => return Err(format!("unsupported sample format {other:?}")),
    }
    .map_err(|e| e.to_string())?;
    stream.play().map_err(|e| e.to_string())?;

    info!(channels, sample_rate, ?sample_format, "Output stream started");
    Ok((stream, channels, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Receiver<i16>,
    level: Arc<AtomicU8>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = usize::from(config.channels).max(1);
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let sample = match queue.try_recv() {
                    Ok(sample) => f32::from(sample) / 32768.0,
                    Err(_) => {
                        let held = i16::from(level.load(Ordering::Relaxed)) - i16::from(U8_CENTER);
                        f32::from(held) / 128.0
                    }
                };
                for out in frame.iter_mut() {
                    *out = T::from_sample(sample);
                }
            }
        },
        |err| error!("Output stream error: {}", err),
        None,
    )
}

/// Writes the DAC level that the output stream samples and holds.
pub struct CpalDac {
    level: Arc<AtomicU8>,
    _keepalive: Arc<Sender<()>>,
}

impl DacOutput for CpalDac {
    fn write(&mut self, value: u8) {
        self.level.store(value, Ordering::Relaxed);
    }
}

/// Feeds chunks into the output queue, resampling by sample repetition to the
/// device rate and keeping only the first channel.
pub struct CpalBulkOutput {
    queue: Sender<i16>,
    device_rate: u32,
    phase: u64,
    _keepalive: Arc<Sender<()>>,
}

impl BulkOutput for CpalBulkOutput {
    fn write_blocking(
        &mut self,
        samples: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> Result<(), OutputError> {
        let sample_rate = u64::from(sample_rate.max(1));
        for &sample in samples.iter().step_by(usize::from(channels.max(1))) {
            self.phase += u64::from(self.device_rate);
            while self.phase >= sample_rate {
                self.queue
                    .send(sample)
                    .map_err(|_| OutputError::Disconnected)?;
                self.phase -= sample_rate;
            }
        }
        Ok(())
    }
}
