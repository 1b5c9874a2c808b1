//! In-process media handles used by the dual-buffer backend.
//!
//! A [`MediaHandle`] owns one decodable source. Loading happens off the
//! caller's thread and is observed by polling [`MediaHandle::status`], so
//! the backend never blocks on file I/O.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
    thread,
    time::Duration,
};

use {
    async_channel::{Receiver, TryRecvError, bounded},
    rodio::{Decoder, Sink, Source, mixer::Mixer},
    symphonia::{
        core::{
            codecs::CODEC_TYPE_NULL,
            formats::FormatOptions,
            io::{MediaSourceStream, MediaSourceStreamOptions},
            meta::MetadataOptions,
            probe::Hint,
        },
        default::get_probe,
    },
    tracing::{debug, warn},
};

use crate::error::LoadError;

/// Lifecycle of a media handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MediaStatus {
    /// Nothing loaded.
    #[default]
    Empty,
    /// A load was started and has not completed.
    Loading,
    /// Loaded and able to play; may be playing or paused.
    Ready,
    /// Played to the end.
    Ended,
    /// Loading or playback failed.
    Failed(String),
}

/// One decodable audio source with transport controls.
pub trait MediaHandle {
    /// Starts loading `path`, discarding whatever was loaded before.
    fn begin_load(&mut self, path: &str);

    /// Reports the current status, completing a pending load if it finished.
    fn status(&mut self) -> MediaStatus;

    /// Starts or resumes output.
    fn play(&mut self);

    /// Pauses output, keeping the position.
    fn pause(&mut self);

    /// Moves the playhead to `position` seconds.
    fn seek(&mut self, position: f64);

    /// Sets the output volume in `[0, 1]`.
    fn set_volume(&mut self, volume: f32);

    /// Playhead position in seconds.
    fn position(&self) -> f64;

    /// Duration of the loaded source in seconds (0 when unknown).
    fn duration(&self) -> f64;

    /// Releases the loaded source and cancels any pending load.
    fn unload(&mut self);
}

/// Reads the duration of an audio file and checks that it can be decoded.
///
/// # Arguments
///
/// * `path` - Path to the audio file
///
/// # Returns
///
/// Duration in seconds, or 0 if the container does not declare one.
///
/// # Errors
///
/// Returns `LoadError` if the file cannot be opened, the format is not
/// recognized, or it holds no audio track.
pub fn probe_duration(path: &Path) -> Result<f64, LoadError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| LoadError::new(&display, e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| LoadError::new(&display, format!("unsupported format: {e}")))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::new(&display, "no audio track found"))?;

    let params = &track.codec_params;
    let duration = match (params.time_base, params.n_frames, params.sample_rate) {
        (Some(time_base), Some(frames), _) => {
            let time = time_base.calc_time(frames);
            time.seconds as f64 + time.frac
        }
        (None, Some(frames), Some(rate)) if rate > 0 => frames as f64 / f64::from(rate),
        _ => 0.0,
    };

    Ok(duration)
}

/// Decoded source handed back by the loader thread.
struct PreparedSource {
    source: Decoder<BufReader<File>>,
    duration: f64,
}

/// Opens, probes and prepares a decoder for `path`.
fn prepare(path: &str) -> Result<PreparedSource, LoadError> {
    let probed = probe_duration(Path::new(path))?;
    let file = File::open(path).map_err(|e| LoadError::new(path, e.to_string()))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| LoadError::new(path, format!("cannot decode: {e}")))?;

    let duration = if probed > 0.0 {
        probed
    } else {
        source
            .total_duration()
            .map_or(0.0, |duration| duration.as_secs_f64())
    };

    Ok(PreparedSource { source, duration })
}

/// Media handle backed by a `rodio` sink on a shared output mixer.
pub struct SinkMedia {
    /// Mixer of the shared output stream.
    mixer: Mixer,
    /// Sink holding the loaded source, created paused.
    sink: Option<Sink>,
    /// Result of the in-flight load, if any.
    pending: Option<Receiver<Result<PreparedSource, LoadError>>>,
    status: MediaStatus,
    duration: f64,
    volume: f32,
}

impl SinkMedia {
    /// Creates an empty handle that will play through `mixer`.
    #[must_use]
    pub fn new(mixer: Mixer) -> Self {
        Self {
            mixer,
            sink: None,
            pending: None,
            status: MediaStatus::Empty,
            duration: 0.0,
            volume: 1.0,
        }
    }

    fn install(&mut self, prepared: PreparedSource) {
        let sink = Sink::connect_new(&self.mixer);
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(prepared.source);
        self.sink = Some(sink);
        self.duration = prepared.duration;
        self.status = MediaStatus::Ready;
    }
}

impl MediaHandle for SinkMedia {
    fn begin_load(&mut self, path: &str) {
        self.unload();

        let (tx, rx) = bounded(1);
        let path = path.to_string();
        thread::spawn(move || {
            let result = prepare(&path);
            if tx.send_blocking(result).is_err() {
                debug!(path = %path, "Discarding superseded load");
            }
        });

        self.pending = Some(rx);
        self.status = MediaStatus::Loading;
    }

    fn status(&mut self) -> MediaStatus {
        if let Some(pending) = &self.pending {
            match pending.try_recv() {
                Ok(Ok(prepared)) => {
                    self.pending = None;
                    self.install(prepared);
                }
                Ok(Err(e)) => {
                    self.pending = None;
                    self.status = MediaStatus::Failed(e.reason);
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    self.pending = None;
                    self.status = MediaStatus::Failed("loader exited unexpectedly".to_string());
                }
            }
        }

        if self.status == MediaStatus::Ready && self.sink.as_ref().is_some_and(Sink::empty) {
            self.status = MediaStatus::Ended;
        }

        self.status.clone()
    }

    fn play(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn seek(&mut self, position: f64) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.try_seek(Duration::from_secs_f64(position.max(0.0))) {
            warn!(position, error = %e, "Seek failed");
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn position(&self) -> f64 {
        self.sink
            .as_ref()
            .map_or(0.0, |sink| sink.get_pos().as_secs_f64())
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn unload(&mut self) {
        self.pending = None;
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.duration = 0.0;
        self.status = MediaStatus::Empty;
    }
}
