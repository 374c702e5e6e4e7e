//! Exclusive access to the audio input device
//!
//! A [`DeviceLease`] is the only way to read frames. Acquiring one starts the
//! source and dropping it stops the source, and because the lease borrows the
//! [`AudioDevice`] mutably there can never be two readers at once.

use async_trait::async_trait;

use super::AudioFrame;
use crate::Result;

/// A physical input stream producing fixed-length frames
///
/// Futures are not `Send`: cpal streams must stay on the thread that built them.
#[async_trait(?Send)]
pub trait AudioSource {
    /// Begin capturing. Calling it on a running source is a no-op
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the stream cannot be opened
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and discard buffered samples. Idempotent
    fn stop(&mut self);

    /// Wait for exactly one frame
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the source is stopped or the stream died
    async fn read(&mut self) -> Result<AudioFrame>;
}

/// Owner of one audio source, handing it out through leases
pub struct AudioDevice {
    source: Box<dyn AudioSource>,
}

impl AudioDevice {
    /// Wrap a source
    #[must_use]
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self { source }
    }

    /// Start the source and take the read lease
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be started
    pub fn acquire(&mut self) -> Result<DeviceLease<'_>> {
        self.source.start()?;
        tracing::trace!("device lease acquired");
        Ok(DeviceLease {
            source: self.source.as_mut(),
        })
    }
}

/// Sole read access to a started device; stops it on drop
pub struct DeviceLease<'a> {
    source: &'a mut dyn AudioSource,
}

impl DeviceLease<'_> {
    /// Read one frame
    ///
    /// Cancel-safe: samples already buffered survive a dropped read.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` on stream failure
    pub async fn read(&mut self) -> Result<AudioFrame> {
        self.source.read().await
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        self.source.stop();
        tracing::trace!("device lease released");
    }
}
