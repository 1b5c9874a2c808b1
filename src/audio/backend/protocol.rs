//! Wire protocol spoken with the native audio service.
//!
//! Each message is one JSON object per line, tagged by `"type"`.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string},
};

use crate::{
    audio::backend::{BackendEvent, SpectrumFrame},
    error::{LoadError, PlaybackError},
};

/// Requests sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceRequest {
    Load {
        track_id: i64,
        path: String,
        auto_play: bool,
    },
    Play,
    Pause,
    Seek {
        position: f64,
    },
    SetVolume {
        volume: f32,
    },
    Preload {
        track_id: i64,
        path: String,
    },
    CancelPreload,
    PlayNext,
    Stop,
    SetLookahead {
        seconds: f64,
    },
}

/// Messages pushed by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceMessage {
    /// Handshake, sent once after startup.
    Ready { version: String },
    /// Periodic progress tick.
    State {
        position: f64,
        duration: f64,
        playing: bool,
    },
    Loaded {
        track_id: i64,
        duration: f64,
        #[serde(default)]
        playing: bool,
    },
    Preloaded {
        track_id: i64,
    },
    TrackEnded {
        #[serde(default)]
        track_id: Option<i64>,
    },
    TrackChanged {
        track_id: i64,
        duration: f64,
    },
    Error {
        message: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        track_id: Option<i64>,
    },
    Spectrum {
        bands: Vec<f32>,
        rms: f32,
        peak: f32,
    },
}

impl ServiceMessage {
    /// Maps a service message onto the backend-agnostic event vocabulary.
    ///
    /// # Returns
    ///
    /// `None` for protocol-level messages the controller never sees.
    #[must_use]
    pub fn into_backend_event(self) -> Option<BackendEvent> {
        let event = match self {
            Self::Ready { .. } => return None,
            Self::State {
                position,
                duration,
                playing,
            } => BackendEvent::Tick {
                current_time: position,
                duration,
                playing,
            },
            Self::Loaded {
                track_id,
                duration,
                playing,
            } => BackendEvent::Loaded {
                track_id,
                duration,
                playing,
            },
            Self::Preloaded { track_id } => BackendEvent::Preloaded { track_id },
            Self::TrackEnded { track_id } => BackendEvent::TrackEnded { track_id },
            Self::TrackChanged { track_id, duration } => {
                BackendEvent::TrackChanged { track_id, duration }
            }
            Self::Error {
                message,
                path,
                track_id,
            } => BackendEvent::Error {
                track_id,
                error: match path {
                    Some(path) => LoadError::new(path, message).into(),
                    None => PlaybackError::transport(message),
                },
            },
            Self::Spectrum { bands, rms, peak } => {
                BackendEvent::Spectrum(SpectrumFrame { bands, rms, peak })
            }
        };
        Some(event)
    }
}

/// Serializes a request as a single newline-terminated line.
///
/// # Errors
///
/// Returns an error if the request cannot be serialized.
pub fn encode_request(request: &ServiceRequest) -> Result<String, SerdeJsonError> {
    let mut line = to_string(request)?;
    line.push('\n');
    Ok(line)
}

/// Parses one line received from the service.
///
/// # Errors
///
/// Returns an error if the line is not a known message.
pub fn decode_message(line: &str) -> Result<ServiceMessage, SerdeJsonError> {
    from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use crate::{
        audio::backend::{
            BackendEvent,
            protocol::{ServiceMessage, ServiceRequest, decode_message, encode_request},
        },
        error::{LoadError, PlaybackError},
    };

    #[test]
    fn test_encode_request_shape() {
        let line = encode_request(&ServiceRequest::Load {
            track_id: 4,
            path: "/music/a.flac".to_string(),
            auto_play: true,
        })
        .unwrap();
        assert_eq!(
            line,
            "{\"type\":\"load\",\"track_id\":4,\"path\":\"/music/a.flac\",\"auto_play\":true}\n"
        );

        let line = encode_request(&ServiceRequest::CancelPreload).unwrap();
        assert_eq!(line, "{\"type\":\"cancel_preload\"}\n");
    }

    #[test]
    fn test_decode_messages() {
        assert_eq!(
            decode_message("{\"type\":\"ready\",\"version\":\"1.2\"}\r\n").unwrap(),
            ServiceMessage::Ready {
                version: "1.2".to_string()
            }
        );
        assert_eq!(
            decode_message("{\"type\":\"track_ended\"}").unwrap(),
            ServiceMessage::TrackEnded { track_id: None }
        );
        assert!(decode_message("{\"type\":\"bogus\"}").is_err());
        assert!(decode_message("not json").is_err());
    }

    #[test]
    fn test_state_maps_to_tick() {
        let event = decode_message(
            "{\"type\":\"state\",\"position\":12.5,\"duration\":180.0,\"playing\":true}",
        )
        .unwrap()
        .into_backend_event();
        assert_eq!(
            event,
            Some(BackendEvent::Tick {
                current_time: 12.5,
                duration: 180.0,
                playing: true
            })
        );
    }

    #[test]
    fn test_error_mapping() {
        let with_path = ServiceMessage::Error {
            message: "unsupported format".to_string(),
            path: Some("/x.wma".to_string()),
            track_id: None,
        };
        assert_eq!(
            with_path.into_backend_event(),
            Some(BackendEvent::Error {
                track_id: None,
                error: LoadError::new("/x.wma", "unsupported format").into(),
            })
        );

        let without_path = ServiceMessage::Error {
            message: "device lost".to_string(),
            path: None,
            track_id: None,
        };
        assert_eq!(
            without_path.into_backend_event(),
            Some(BackendEvent::Error {
                track_id: None,
                error: PlaybackError::transport("device lost"),
            })
        );
    }

    #[test]
    fn test_error_carries_track_id() {
        let message =
            decode_message("{\"type\":\"error\",\"message\":\"device lost\",\"track_id\":3}")
                .unwrap();
        assert_eq!(
            message.into_backend_event(),
            Some(BackendEvent::Error {
                track_id: Some(3),
                error: PlaybackError::transport("device lost"),
            })
        );
    }

    #[test]
    fn test_ready_is_not_forwarded() {
        let ready = ServiceMessage::Ready {
            version: "1".to_string(),
        };
        assert!(ready.into_backend_event().is_none());
    }
}
