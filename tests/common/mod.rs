//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, keyword spotter, transcriber,
//! generator, synthesizer and audio sink. Every frame carries its sequence
//! number in the first sample so spotters can be scripted per frame.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use buddy_voice::audio::{AudioDevice, AudioFrame, AudioSource, FRAME_LENGTH, KeywordSpotter};
use buddy_voice::conversation::{ConversationTurn, Services, TranscriptFragment};
use buddy_voice::listener::DeviceOpener;
use buddy_voice::llm::ResponseGenerator;
use buddy_voice::playback::{AudioSink, SinkLauncher};
use buddy_voice::signal::StopSignal;
use buddy_voice::speech::{AudioChunks, Synthesizer, Transcriber, TranscriptionConnection};
use buddy_voice::{Error, Result};
use futures::StreamExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Build a frame whose first sample is `marker`
#[must_use]
pub fn marked_frame(marker: usize) -> AudioFrame {
    let mut samples = vec![0i16; FRAME_LENGTH];
    samples[0] = i16::try_from(marker).unwrap_or(i16::MAX);
    AudioFrame::new(samples)
}

/// Sequence number carried by a frame
#[must_use]
pub fn marker_of(frame: &AudioFrame) -> usize {
    usize::try_from(frame.samples()[0]).unwrap_or(usize::MAX)
}

// --- microphone ---

/// Counters shared by every device a [`FakeMic`] opens
#[derive(Debug, Default)]
pub struct MicStats {
    pub opens: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub reads: AtomicUsize,
}

impl MicStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Microphone producing numbered frames forever
#[derive(Clone, Default)]
pub struct FakeMic {
    pub stats: Arc<MicStats>,
    /// Read number that fails with a device error
    pub fail_at_read: Option<usize>,
    /// Cancel the token once this many frames have been read
    pub cancel_at_read: Option<(usize, CancellationToken)>,
}

impl FakeMic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_at(mut self, reads: usize, token: &CancellationToken) -> Self {
        self.cancel_at_read = Some((reads, token.clone()));
        self
    }

    pub fn failing_at(mut self, read: usize) -> Self {
        self.fail_at_read = Some(read);
        self
    }

    /// Open a device over this microphone
    pub fn device(&self) -> AudioDevice {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        AudioDevice::new(Box::new(ScriptedSource {
            mic: self.clone(),
            running: false,
        }))
    }

    pub fn opener(&self) -> DeviceOpener {
        let mic = self.clone();
        Box::new(move || Ok(mic.device()))
    }
}

struct ScriptedSource {
    mic: FakeMic,
    running: bool,
}

#[async_trait(?Send)]
impl AudioSource for ScriptedSource {
    fn start(&mut self) -> Result<()> {
        if !self.running {
            self.running = true;
            self.mic.stats.starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.mic.stats.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn read(&mut self) -> Result<AudioFrame> {
        if !self.running {
            return Err(Error::Device("read on stopped source".to_string()));
        }
        tokio::task::yield_now().await;

        let n = self.mic.stats.reads.fetch_add(1, Ordering::SeqCst);
        if self.mic.fail_at_read == Some(n) {
            return Err(Error::Device("microphone unplugged".to_string()));
        }
        if let Some((at, token)) = &self.mic.cancel_at_read {
            if n + 1 >= *at {
                token.cancel();
            }
        }
        Ok(marked_frame(n))
    }
}

// --- keyword spotter ---

/// Scripted reply for one frame
#[derive(Debug, Clone, Copy)]
pub enum Spot {
    Slot(usize),
    Fail,
}

/// Spotter answering per frame marker
#[derive(Default)]
pub struct ScriptedSpotter {
    script: HashMap<usize, Spot>,
    stop_when: Option<Arc<dyn Fn() -> bool>>,
    pub processed: Arc<Mutex<Vec<usize>>>,
    /// `reset` calls, paired with how many frames had been processed
    pub resets: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedSpotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, marker: usize, spot: Spot) -> Self {
        self.script.insert(marker, spot);
        self
    }

    /// Report the stop phrase on any frame once `condition` holds
    pub fn stop_when(mut self, condition: impl Fn() -> bool + 'static) -> Self {
        self.stop_when = Some(Arc::new(condition));
        self
    }
}

#[async_trait(?Send)]
impl KeywordSpotter for ScriptedSpotter {
    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn reset(&mut self) {
        let processed = self.processed.lock().map(|p| p.len()).unwrap_or(0);
        if let Ok(mut resets) = self.resets.lock() {
            resets.push(processed);
        }
    }

    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<usize>> {
        let marker = marker_of(frame);
        if let Ok(mut processed) = self.processed.lock() {
            processed.push(marker);
        }

        if let Some(condition) = &self.stop_when {
            if condition() {
                return Ok(Some(buddy_voice::audio::STOP_SLOT));
            }
        }

        match self.script.get(&marker) {
            Some(Spot::Slot(slot)) => Ok(Some(*slot)),
            Some(Spot::Fail) => Err(Error::Spotter(format!("frame {marker} unreadable"))),
            None => Ok(None),
        }
    }
}

// --- transcriber ---

/// Fragments delivered on one connection
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fragments: Vec<TranscriptFragment>,
    /// Close the stream once the fragments run out
    pub close_after: bool,
}

impl Script {
    pub fn says(text: &str) -> Self {
        Self {
            fragments: vec![TranscriptFragment::last(text)],
            close_after: false,
        }
    }

    pub fn fragments(fragments: Vec<TranscriptFragment>) -> Self {
        Self {
            fragments,
            close_after: false,
        }
    }
}

/// What the transcriber saw
#[derive(Debug, Default)]
pub struct TranscriberLog {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub frames_sent: AtomicUsize,
    /// Microphone read count at each connect
    pub reads_at_connect: Mutex<Vec<usize>>,
}

impl TranscriberLog {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }
}

/// Transcriber replaying one script per connection
///
/// A fragment is only released after a frame has been sent for it. Once
/// the scripts run out, connections stay silent.
#[derive(Default)]
pub struct ScriptedTranscriber {
    scripts: Mutex<VecDeque<Script>>,
    fail_connect: bool,
    mic: Option<Arc<MicStats>>,
    pub log: Arc<TranscriberLog>,
}

impl ScriptedTranscriber {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn watching(mut self, mic: &FakeMic) -> Self {
        self.mic = Some(mic.stats.clone());
        self
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn connect(&self) -> Result<Box<dyn TranscriptionConnection>> {
        if self.fail_connect {
            return Err(Error::Stream("connection refused".to_string()));
        }

        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if let (Some(mic), Ok(mut reads)) = (&self.mic, self.log.reads_at_connect.lock()) {
            reads.push(mic.reads());
        }

        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .unwrap_or_default();

        Ok(Box::new(ScriptedConnection {
            fragments: script.fragments.into(),
            close_after: script.close_after,
            sent: 0,
            released: 0,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedConnection {
    fragments: VecDeque<TranscriptFragment>,
    close_after: bool,
    sent: usize,
    released: usize,
    log: Arc<TranscriberLog>,
}

#[async_trait]
impl TranscriptionConnection for ScriptedConnection {
    async fn send(&mut self, _frame: AudioFrame) -> Result<()> {
        self.sent += 1;
        self.log.frames_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<TranscriptFragment>> {
        if self.sent > self.released {
            if let Some(fragment) = self.fragments.pop_front() {
                self.released += 1;
                return Ok(Some(fragment));
            }
            if self.close_after {
                return Ok(None);
            }
        }
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// --- generator ---

/// Generator replaying queued replies and recording every call
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<(Vec<ConversationTurn>, String)>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(&self, history: &[ConversationTurn], text: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((history.to_vec(), text.to_string()));
        }

        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

// --- synthesizer ---

/// Synthesizer yielding `chunks` numbered chunks
#[derive(Default)]
pub struct ChunkSynthesizer {
    chunks: usize,
    fail: bool,
    pub calls: AtomicUsize,
}

impl ChunkSynthesizer {
    pub fn new(chunks: usize) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Payload of chunk `i`
pub fn chunk(i: usize) -> Vec<u8> {
    vec![u8::try_from(i).unwrap_or(u8::MAX); 4]
}

#[async_trait]
impl Synthesizer for ChunkSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioChunks> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Stream("synthesis unavailable".to_string()));
        }

        let chunks: Vec<Result<Vec<u8>>> = (0..self.chunks).map(|i| Ok(chunk(i))).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

// --- sink ---

/// Everything every sink of one launcher did
#[derive(Debug, Default)]
pub struct SinkLog {
    pub launches: AtomicUsize,
    pub kills: AtomicUsize,
    pub finishes: AtomicUsize,
    pub writes: Mutex<Vec<Vec<u8>>>,
    /// Kill handle of every sink launched
    pub kill_handles: Mutex<Vec<StopSignal>>,
}

impl SinkLog {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Whether the most recent sink has been told to die
    pub fn kill_requested(&self) -> bool {
        self.kill_handles
            .lock()
            .ok()
            .and_then(|handles| handles.last().map(StopSignal::is_set))
            .unwrap_or(false)
    }
}

/// Launcher for in-memory sinks
#[derive(Default)]
pub struct RecordingLauncher {
    /// Write index that never completes
    pub hang_at: Option<usize>,
    /// Write index that reports a closed sink
    pub close_at: Option<usize>,
    /// Yield to other futures before every write lands
    pub yielding: bool,
    /// Notified when a write starts hanging
    pub blocked: Arc<Notify>,
    pub log: Arc<SinkLog>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hanging_at(mut self, write: usize) -> Self {
        self.hang_at = Some(write);
        self
    }

    pub fn closing_at(mut self, write: usize) -> Self {
        self.close_at = Some(write);
        self
    }

    /// Sink whose writes always complete, after giving other futures a turn
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }
}

impl SinkLauncher for RecordingLauncher {
    fn launch(&self) -> Result<Box<dyn AudioSink>> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        let kill = StopSignal::new();
        if let Ok(mut handles) = self.log.kill_handles.lock() {
            handles.push(kill.clone());
        }

        Ok(Box::new(RecordingSink {
            attempts: 0,
            hang_at: self.hang_at,
            close_at: self.close_at,
            yielding: self.yielding,
            blocked: self.blocked.clone(),
            kill,
            log: self.log.clone(),
        }))
    }
}

struct RecordingSink {
    attempts: usize,
    hang_at: Option<usize>,
    close_at: Option<usize>,
    yielding: bool,
    blocked: Arc<Notify>,
    kill: StopSignal,
    log: Arc<SinkLog>,
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<bool> {
        let index = self.attempts;
        self.attempts += 1;

        if self.yielding {
            tokio::task::yield_now().await;
        }

        if self.hang_at == Some(index) {
            self.blocked.notify_one();
            std::future::pending::<()>().await;
        }
        if self.close_at == Some(index) {
            return Ok(false);
        }

        if let Ok(mut writes) = self.log.writes.lock() {
            writes.push(chunk.to_vec());
        }
        Ok(true)
    }

    fn kill_handle(&self) -> StopSignal {
        self.kill.clone()
    }

    async fn finish(&mut self) -> Result<()> {
        if self.kill.is_set() {
            self.log.kills.fetch_add(1, Ordering::SeqCst);
        }
        self.log.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// --- wiring ---

/// Bundle fakes into session services
pub fn services(
    transcriber: &Arc<ScriptedTranscriber>,
    generator: &Arc<ScriptedGenerator>,
    synthesizer: &Arc<ChunkSynthesizer>,
    launcher: &Arc<RecordingLauncher>,
) -> Services {
    Services {
        transcriber: transcriber.clone(),
        generator: generator.clone(),
        synthesizer: synthesizer.clone(),
        sink: launcher.clone(),
    }
}
