//! Audio sink processes
//!
//! Raw PCM is piped into an external player (ffplay by default).

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::signal::StopSignal;
use crate::{Error, Result};

/// A running sink accepting PCM bytes
#[async_trait]
pub trait AudioSink: Send {
    /// Write one chunk
    ///
    /// Returns `false` when the sink has closed its input (broken pipe).
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` on any other write failure
    async fn write(&mut self, chunk: &[u8]) -> Result<bool>;

    /// Handle that terminates the sink as soon as it is set
    ///
    /// Any task may set it, including one that does not own the sink.
    fn kill_handle(&self) -> StopSignal;

    /// Close the sink's input and wait for it to exit
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if waiting on the sink fails
    async fn finish(&mut self) -> Result<()>;
}

/// Starts one sink per playback
pub trait SinkLauncher: Send + Sync {
    /// Spawn a sink
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the sink is unavailable
    fn launch(&self) -> Result<Box<dyn AudioSink>>;
}

/// Launches an external player reading PCM on stdin
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Launcher for an arbitrary player command
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// `ffplay -autoexit - -nodisp`, probing the format from the stream
    #[must_use]
    pub fn ffplay() -> Self {
        let args = ["-autoexit", "-", "-nodisp"]
            .iter()
            .map(ToString::to_string)
            .collect();

        Self::new("ffplay".to_string(), args)
    }

    /// Player program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the player binary can be found on `PATH`
    #[must_use]
    pub fn is_installed(&self) -> bool {
        which::which(&self.program).is_ok()
    }
}

impl SinkLauncher for ProcessLauncher {
    fn launch(&self) -> Result<Box<dyn AudioSink>> {
        if !self.is_installed() {
            return Err(Error::Playback(format!(
                "{} not found, necessary to stream audio",
                self.program
            )));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Playback(format!("failed to spawn {}: {e}", self.program)))?;

        let stdin = child.stdin.take();
        tracing::debug!(program = %self.program, pid = ?child.id(), "sink started");

        let kill = StopSignal::new();
        let killed = kill.clone();
        let exit = tokio::spawn(async move {
            tokio::select! {
                () = killed.wait() => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(error = %e, "sink already gone");
                    } else {
                        tracing::debug!("sink killed");
                    }
                    child.wait().await
                }
                status = child.wait() => status,
            }
        });

        Ok(Box::new(ProcessSink {
            stdin,
            kill,
            exit: Some(exit),
        }))
    }
}

/// A spawned player process
///
/// A supervisor task owns the child so the kill handle works without
/// access to the sink.
struct ProcessSink {
    stdin: Option<ChildStdin>,
    kill: StopSignal,
    exit: Option<JoinHandle<std::io::Result<std::process::ExitStatus>>>,
}

#[async_trait]
impl AudioSink for ProcessSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<bool> {
        if self.kill.is_set() {
            self.stdin = None;
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(false);
        };

        let written = async {
            stdin.write_all(chunk).await?;
            stdin.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                self.stdin = None;
                Ok(false)
            }
            Err(e) => Err(Error::Playback(format!("sink write failed: {e}"))),
        }
    }

    fn kill_handle(&self) -> StopSignal {
        self.kill.clone()
    }

    async fn finish(&mut self) -> Result<()> {
        self.stdin = None;
        let Some(exit) = self.exit.take() else {
            return Ok(());
        };
        let status = exit
            .await
            .map_err(|e| Error::Playback(format!("sink supervisor failed: {e}")))?
            .map_err(|e| Error::Playback(format!("failed to wait for sink: {e}")))?;
        tracing::debug!(%status, "sink exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffplay_reads_raw_pcm_from_stdin() {
        let launcher = ProcessLauncher::ffplay();

        assert_eq!(launcher.program(), "ffplay");
        assert_eq!(launcher.args, vec!["-autoexit", "-", "-nodisp"]);
    }

    #[test]
    fn test_missing_player_is_a_playback_error() {
        let launcher = ProcessLauncher::new("definitely-not-a-player-binary".to_string(), vec![]);

        assert!(!launcher.is_installed());
        assert!(matches!(launcher.launch(), Err(Error::Playback(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sink_drains_and_exits() {
        let launcher = ProcessLauncher::new("cat".to_string(), vec![]);
        let mut sink = launcher.launch().unwrap();

        assert!(sink.write(b"pcm").await.unwrap());
        sink.finish().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_sink_finishes() {
        let launcher = ProcessLauncher::new("cat".to_string(), vec![]);
        let mut sink = launcher.launch().unwrap();

        sink.kill_handle().set();
        assert!(!sink.write(b"late").await.unwrap());
        sink.finish().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_handle_ends_process_without_the_sink() {
        let launcher = ProcessLauncher::new("sleep".to_string(), vec!["30".to_string()]);
        let mut sink = launcher.launch().unwrap();

        // A detached handle is enough; `sleep` ignores stdin closing
        let kill = sink.kill_handle();
        std::thread::spawn(move || kill.set()).join().unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), sink.finish())
            .await
            .expect("killed sink should exit promptly")
            .unwrap();
    }
}
