//! Centralized state management with reactive updates to observers.
//!
//! This module provides the foundation for exposing player state with
//! thread-safe access and change notifications.

pub mod app_state;

pub use app_state::{AppState, AppStateEvent, PlayerSnapshot};
