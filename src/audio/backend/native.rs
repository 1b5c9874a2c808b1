//! Backend that delegates playback to an out-of-process audio service.
//!
//! Requests are fire-and-forget lines written to the service's stdin; the
//! service pushes state ticks and notifications on its stdout. Nothing is
//! queried synchronously, so every value the controller holds about native
//! playback is the last one reported.

use std::{process::Stdio, time::Duration};

use {
    async_channel::{Receiver, Sender, unbounded},
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines},
        process::{Child, Command},
        spawn,
        time::timeout,
    },
    tracing::{debug, info, warn},
};

use crate::{
    audio::{
        backend::{
            Backend, BackendEvent, BackendKind,
            protocol::{ServiceMessage, ServiceRequest, decode_message, encode_request},
        },
        track::Track,
    },
    error::PlaybackError,
};

/// Native audio service backend.
pub struct NativeBackend {
    /// Outgoing request queue drained by the writer task.
    requests: Sender<ServiceRequest>,
    /// Service process, killed when the backend is dropped.
    child: Option<Child>,
}

impl NativeBackend {
    /// Starts the audio service and waits for its handshake.
    ///
    /// # Arguments
    ///
    /// * `program` - Path of the service executable
    /// * `handshake_timeout` - How long to wait for the `ready` message
    /// * `events` - Channel receiving events reported by the service
    ///
    /// # Returns
    ///
    /// A connected `NativeBackend`.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::BackendUnavailable` if the process cannot be
    /// started, exits, or does not announce itself in time.
    pub async fn spawn(
        program: &str,
        handshake_timeout: Duration,
        events: Sender<BackendEvent>,
    ) -> Result<Self, PlaybackError> {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::unavailable(format!("cannot start {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlaybackError::unavailable("service stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlaybackError::unavailable("service stdout not captured"))?;

        let mut lines = BufReader::new(stdout).lines();
        let version = timeout(handshake_timeout, await_ready(&mut lines))
            .await
            .map_err(|_| {
                PlaybackError::unavailable(format!(
                    "no ready message within {} ms",
                    handshake_timeout.as_millis()
                ))
            })??;
        info!(program, version = %version, "Native audio service ready");

        let (requests, request_rx) = unbounded();
        spawn(write_requests(stdin, request_rx));
        spawn(pump_lines(lines, events));

        Ok(Self {
            requests,
            child: Some(child),
        })
    }

    /// Creates a backend whose requests go to `requests` instead of a process.
    ///
    /// Events are injected by whoever holds the matching event sender.
    #[must_use]
    pub fn from_channel(requests: Sender<ServiceRequest>) -> Self {
        Self {
            requests,
            child: None,
        }
    }

    fn send(&self, request: ServiceRequest) {
        if let Err(e) = self.requests.try_send(request) {
            debug!("NativeBackend: Dropping request, service gone: {e}");
        }
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.requests.close();
        if let Some(child) = self.child.as_mut()
            && let Err(e) = child.start_kill()
        {
            debug!("NativeBackend: Service already exited: {e}");
        }
    }
}

impl Backend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn load(&mut self, track: &Track, auto_play: bool) {
        self.send(ServiceRequest::Load {
            track_id: track.id,
            path: track.audio_path.clone(),
            auto_play,
        });
    }

    fn play(&mut self) {
        self.send(ServiceRequest::Play);
    }

    fn pause(&mut self) {
        self.send(ServiceRequest::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.send(ServiceRequest::Seek { position });
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(ServiceRequest::SetVolume { volume });
    }

    fn preload(&mut self, track: Option<&Track>) {
        match track {
            Some(track) => self.send(ServiceRequest::Preload {
                track_id: track.id,
                path: track.audio_path.clone(),
            }),
            None => self.send(ServiceRequest::CancelPreload),
        }
    }

    fn play_next(&mut self) {
        self.send(ServiceRequest::PlayNext);
    }

    fn stop(&mut self) {
        self.send(ServiceRequest::Stop);
    }

    fn set_lookahead(&mut self, seconds: f64) {
        self.send(ServiceRequest::SetLookahead { seconds });
    }
}

/// Reads lines until the service announces itself.
async fn await_ready<R>(lines: &mut Lines<R>) -> Result<String, PlaybackError>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await {
        Ok(Some(line)) => match decode_message(&line) {
            Ok(ServiceMessage::Ready { version }) => Ok(version),
            Ok(other) => Err(PlaybackError::unavailable(format!(
                "expected ready message, got {other:?}"
            ))),
            Err(e) => Err(PlaybackError::unavailable(format!(
                "malformed handshake: {e}"
            ))),
        },
        Ok(None) => Err(PlaybackError::unavailable("service exited during handshake")),
        Err(e) => Err(PlaybackError::unavailable(format!(
            "cannot read from service: {e}"
        ))),
    }
}

/// Forwards service messages as backend events until the stream ends.
///
/// Malformed lines are skipped. When the stream ends or fails, a single
/// `ServiceClosed` is emitted.
pub async fn pump_lines<R>(mut lines: Lines<R>, events: Sender<BackendEvent>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let message = match decode_message(&line) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, line = %line, "Skipping malformed service message");
                        continue;
                    }
                };
                if let Some(event) = message.into_backend_event()
                    && events.send(event).await.is_err()
                {
                    debug!("NativeBackend: Event receiver dropped, stopping reader");
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Reading from native audio service failed");
                break;
            }
        }
    }

    let _ = events.send(BackendEvent::ServiceClosed).await;
}

/// Writes queued requests to the service until the queue is closed.
///
/// # Returns
///
/// The writer, so callers can inspect what was written.
pub async fn write_requests<W>(mut writer: W, requests: Receiver<ServiceRequest>) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Ok(request) = requests.recv().await {
        let line = match encode_request(&request) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Cannot encode service request");
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "Writing to native audio service failed");
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Flushing native audio service input failed");
            break;
        }
    }
    writer
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {
        async_channel::unbounded,
        tokio::io::{AsyncBufReadExt, BufReader},
    };

    use crate::{
        audio::{
            backend::{
                Backend, BackendEvent, BackendKind,
                native::{NativeBackend, pump_lines, write_requests},
                protocol::ServiceRequest,
            },
            track::Track,
        },
        error::PlaybackError,
    };

    #[test]
    fn test_calls_become_requests() {
        let (tx, rx) = unbounded();
        let mut backend = NativeBackend::from_channel(tx);
        let track = Track {
            id: 3,
            audio_path: "/music/3.flac".to_string(),
            ..Track::default()
        };

        assert_eq!(backend.kind(), BackendKind::Native);
        backend.load(&track, true);
        backend.preload(None);
        backend.seek(12.0);
        backend.set_lookahead(0.2);

        assert_eq!(
            rx.try_recv().unwrap(),
            ServiceRequest::Load {
                track_id: 3,
                path: "/music/3.flac".to_string(),
                auto_play: true
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ServiceRequest::CancelPreload);
        assert_eq!(rx.try_recv().unwrap(), ServiceRequest::Seek { position: 12.0 });
        assert_eq!(
            rx.try_recv().unwrap(),
            ServiceRequest::SetLookahead { seconds: 0.2 }
        );
    }

    #[test]
    fn test_send_after_close_is_silent() {
        let (tx, rx) = unbounded();
        let mut backend = NativeBackend::from_channel(tx);
        drop(rx);
        backend.play();
    }

    #[tokio::test]
    async fn test_pump_lines_skips_garbage_and_reports_close() {
        let input = "{\"type\":\"loaded\",\"track_id\":1,\"duration\":90.0}\n\
                     garbage\n\
                     \n\
                     {\"type\":\"track_changed\",\"track_id\":2,\"duration\":120.0}\n";
        let (tx, rx) = unbounded();

        pump_lines(BufReader::new(input.as_bytes()).lines(), tx).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            BackendEvent::Loaded {
                track_id: 1,
                duration: 90.0,
                playing: false
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BackendEvent::TrackChanged {
                track_id: 2,
                duration: 120.0
            }
        );
        assert_eq!(rx.try_recv().unwrap(), BackendEvent::ServiceClosed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_requests_emits_lines() {
        let (tx, rx) = unbounded();
        tx.send(ServiceRequest::Play).await.unwrap();
        tx.send(ServiceRequest::SetVolume { volume: 0.5 })
            .await
            .unwrap();
        tx.close();

        let written = write_requests(Vec::new(), rx).await;
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "{\"type\":\"play\"}\n{\"type\":\"set_volume\",\"volume\":0.5}\n"
        );
    }

    #[tokio::test]
    async fn test_missing_service_is_unavailable() {
        let (tx, _rx) = unbounded();
        let result = NativeBackend::spawn(
            "/nonexistent/segue-audio-service",
            Duration::from_millis(100),
            tx,
        )
        .await;
        assert!(matches!(
            result,
            Err(PlaybackError::BackendUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_service_times_out() {
        let (tx, _rx) = unbounded();
        let result = NativeBackend::spawn("cat", Duration::from_millis(100), tx).await;
        assert!(matches!(
            result,
            Err(PlaybackError::BackendUnavailable { .. })
        ));
    }
}
