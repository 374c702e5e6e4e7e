//! Audio capture from microphone

use std::collections::VecDeque;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::frame::{SAMPLE_RATE, f32_to_i16};
use super::{AudioFrame, AudioSource};
use crate::{Error, Result};

/// What the capture callbacks hand to the reader
#[derive(Debug)]
enum Captured {
    Samples(Vec<i16>),
    Failed(String),
}

/// Captures framed audio from the default input device
pub struct Microphone {
    config: StreamConfig,
    stream: Option<Stream>,
    tx: mpsc::UnboundedSender<Captured>,
    frames: FrameReader,
}

impl Microphone {
    /// Open the default input device at 16kHz mono
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no suitable input device exists
    pub fn new(frame_length: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Device("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            frame_length,
            "microphone initialized"
        );

        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            stream: None,
            tx,
            frames: FrameReader::new(rx, frame_length),
        })
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait(?Send)]
impl AudioSource for Microphone {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device".to_string()))?;

        let data_tx = self.tx.clone();
        let error_tx = self.tx.clone();
        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let chunk: Vec<i16> = data.iter().copied().map(f32_to_i16).collect();
                    let _ = data_tx.send(Captured::Samples(chunk));
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    let _ = error_tx.send(Captured::Failed(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
        self.frames.discard();
    }

    async fn read(&mut self) -> Result<AudioFrame> {
        if self.stream.is_none() {
            return Err(Error::Device("read from a stopped microphone".to_string()));
        }

        self.frames.next_frame().await
    }
}

/// Cuts callback chunks into fixed-length frames
struct FrameReader {
    rx: mpsc::UnboundedReceiver<Captured>,
    pending: VecDeque<i16>,
    frame_length: usize,
}

impl FrameReader {
    const fn new(rx: mpsc::UnboundedReceiver<Captured>, frame_length: usize) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            frame_length,
        }
    }

    /// Wait for one full frame; a stream failure ends the wait
    async fn next_frame(&mut self) -> Result<AudioFrame> {
        while self.pending.len() < self.frame_length {
            match self.rx.recv().await {
                Some(Captured::Samples(chunk)) => self.pending.extend(chunk),
                Some(Captured::Failed(reason)) => {
                    self.pending.clear();
                    return Err(Error::Device(format!("capture stream failed: {reason}")));
                }
                None => return Err(Error::Device("capture stream closed".to_string())),
            }
        }

        let samples = self.pending.drain(..self.frame_length).collect();
        Ok(AudioFrame::new(samples))
    }

    /// Drop samples and failures captured before the last stop
    fn discard(&mut self) {
        self.pending.clear();
        while self.rx.try_recv().is_ok() {}
    }
}
