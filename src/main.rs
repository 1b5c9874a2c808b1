//! Segue - Gapless Playback Engine
//!
//! Command-line player: plays the audio files given as arguments as one
//! gapless queue and records listening time to the ledger.

use std::{env::args_os, path::PathBuf, process::ExitCode, sync::Arc};

use {
    anyhow::{Result, bail},
    async_channel::{Sender, unbounded},
    tokio::{
        signal::ctrl_c,
        spawn,
        sync::broadcast::{Receiver, error::RecvError},
    },
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

use segue::{
    AppState, AppStateEvent, Command, PlaybackController, QueueCoordinator, SessionTracker,
    SettingsManager, SqliteLedger, Track,
    audio::media::probe_duration,
    error::{ErrorReporter, ResultExt},
    session::SystemClock,
};

/// Main entry point for the Segue player.
///
/// The playback controller owns a single-threaded backend, so everything
/// runs on one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("segue=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::error(&e, "Segue");
            eprintln!("segue: {}", ErrorReporter::to_user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let tracks = tracks_from_args();
    if tracks.is_empty() {
        bail!("usage: segue <audio file>...");
    }

    let manager = SettingsManager::new().add_context("Failed to load settings")?;
    let settings = manager.get_settings().clone();

    let ledger_path = settings.ledger_path();
    let ledger = Arc::new(
        SqliteLedger::open(&ledger_path)
            .await
            .add_contextf(format!("Failed to open listen ledger at {}", ledger_path.display()))?,
    );
    let controller = PlaybackController::initialize(&settings)
        .await
        .add_context("Failed to initialize playback")?;
    let sessions = SessionTracker::new(settings.ceilings, settings.history_capacity, ledger.clone());
    let app_state = AppState::new();

    let mut coordinator = QueueCoordinator::new(
        controller,
        sessions,
        app_state.clone(),
        Box::new(SystemClock),
        &settings,
    );

    let (commands_tx, commands_rx) = unbounded();
    spawn(forward_ctrl_c(commands_tx.clone()));
    spawn(watch_state(app_state.subscribe(), app_state, commands_tx));

    coordinator.set_queue(tracks, 0);
    coordinator.play_at(0);
    coordinator.run(commands_rx).await;

    let recently_played = coordinator.sessions().history().len();
    ledger.close().await;
    match ledger.listen_count().await {
        Ok(listens) => info!(recently_played, listens, "Playback finished"),
        Err(e) => warn!(error = %e, "Could not read listen count"),
    }
    Ok(())
}

/// Builds the queue from the file paths on the command line.
fn tracks_from_args() -> Vec<Track> {
    args_os()
        .skip(1)
        .map(PathBuf::from)
        .zip(1..)
        .map(|(path, id)| {
            let duration = probe_duration(&path).unwrap_or_else(|e| {
                warn!(error = %e, "Could not read duration");
                0.0
            });
            Track {
                id,
                title: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                audio_path: path.to_string_lossy().into_owned(),
                duration,
                ..Track::default()
            }
        })
        .collect()
}

async fn forward_ctrl_c(commands: Sender<Command>) {
    if ctrl_c().await.is_ok() {
        info!("Interrupted, flushing listening session");
        let _ = commands.send(Command::Shutdown).await;
    }
}

/// Skips past failed tracks and ends the process once playback runs out.
async fn watch_state(
    mut events: Receiver<AppStateEvent>,
    state: AppState,
    commands: Sender<Command>,
) {
    let mut recovering = false;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };

        let command = match event {
            AppStateEvent::PlaybackChanged {
                is_playing: true,
                track: Some(track),
            } => {
                recovering = false;
                info!(title = %track.title, duration = track.duration, "Now playing");
                None
            }
            AppStateEvent::PlaybackChanged { track: Some(_), .. } => {
                recovering = false;
                None
            }
            AppStateEvent::PlaybackChanged { track: None, .. } if !recovering => {
                Some(Command::Shutdown)
            }
            AppStateEvent::ErrorRaised(error) => {
                warn!(message = %error.message, "Skipping unplayable track");
                let snapshot = state.snapshot();
                if snapshot.position + 1 < snapshot.queue.len() {
                    recovering = true;
                    Some(Command::SkipNext)
                } else {
                    Some(Command::Shutdown)
                }
            }
            _ => None,
        };

        if let Some(command) = command
            && commands.send(command).await.is_err()
        {
            break;
        }
    }
}
