//! Audio playback system.
//!
//! Provides gapless playback across two interchangeable backends (an
//! out-of-process native audio service and an in-process dual-buffer
//! fallback built on rodio and symphonia), the playback controller that
//! owns transport state, and the queue coordinator that drives it.

pub mod backend;
pub mod engine;
pub mod media;
pub mod queue_coordinator;
pub mod track;
