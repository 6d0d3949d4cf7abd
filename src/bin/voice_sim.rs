//! Voice Session Simulator
//!
//! Drives the voice client against the in-process transport: a remote
//! participant talks in a room the primary session joins, the local speaker
//! shows up late, and the primary session later moves and leaves.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_room_sync::{
    audio::device::DeviceCatalog,
    binding::Speaker,
    config::AppConfig,
    constants::*,
    local::Recorder,
    network::{LoopbackTransport, VoiceNetwork},
    protocol::{EndpointRef, HostingMode, StreamInfo},
    session::SharedPrimarySession,
};

/// Scripted step of the simulation, keyed by service tick
#[derive(Debug, Clone, Copy)]
enum Step {
    PrimaryJoin(&'static str),
    RegisterSpeaker,
    PrimaryLeave,
    Quit,
}

const SCRIPT: &[(u32, Step)] = &[
    (5, Step::PrimaryJoin("Arena1")),
    (25, Step::RegisterSpeaker),
    (75, Step::PrimaryJoin("Arena2")),
    (125, Step::PrimaryLeave),
    (140, Step::Quit),
];

const REMOTE_PARTICIPANT: i32 = 7;
const REMOTE_ENDPOINT: EndpointRef = EndpointRef(42);
const LOCAL_ENDPOINT: EndpointRef = EndpointRef(1);

#[cfg(feature = "host-audio")]
fn device_catalog() -> Box<dyn DeviceCatalog> {
    Box::new(voice_room_sync::audio::device::HostDeviceCatalog)
}

#[cfg(not(feature = "host-audio"))]
fn device_catalog() -> Box<dyn DeviceCatalog> {
    Box::new(voice_room_sync::audio::device::StaticDeviceCatalog::from_names([
        "Simulated Microphone",
    ]))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting voice session simulator");

    let catalog = device_catalog();
    println!("\n=== Available Input Devices ===");
    match catalog.input_devices() {
        Ok(devices) => {
            for device in &devices {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}{}", device.name, default_marker);
            }
        }
        Err(e) => tracing::warn!("{}", e),
    }
    println!();

    let transport = LoopbackTransport::new();
    let peer = transport.remote_peer(REMOTE_PARTICIPANT);
    let primary = SharedPrimarySession::new(HostingMode::default());
    let mut network = VoiceNetwork::from_config(transport, primary.clone(), &config, catalog);

    network.add_recorder(Recorder::new(LOCAL_ENDPOINT, DEFAULT_SAMPLE_RATE, 1));

    // The remote participant is already talking before anyone local listens
    let remote_info = StreamInfo::new(DEFAULT_SAMPLE_RATE, 1, 0, REMOTE_ENDPOINT);
    peer.publish(1, remote_info);

    let speaker = Arc::new(Speaker::new(REMOTE_ENDPOINT));
    let frame_samples = (DEFAULT_SAMPLE_RATE as u64 * SERVICE_INTERVAL_MS / 1000) as usize;

    let mut interval = tokio::time::interval(Duration::from_millis(SERVICE_INTERVAL_MS));
    let mut tick: u32 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
        tick += 1;

        let mut quit = false;
        for (_, step) in SCRIPT.iter().filter(|(at, _)| *at == tick) {
            tracing::info!("Tick {}: {:?}", tick, step);
            match step {
                Step::PrimaryJoin(room) => {
                    primary.set_joined(*room);
                    network.on_primary_session_joined_room();
                }
                Step::RegisterSpeaker => network.register_endpoint(speaker.clone()),
                Step::PrimaryLeave => {
                    primary.set_left();
                    network.on_primary_session_left_room();
                }
                Step::Quit => quit = true,
            }
        }
        if quit {
            break;
        }

        peer.send_frame(1, vec![0.0; frame_samples]);
        network.service();

        // Stands in for the audio callback consuming one frame per tick
        let output = speaker.output();
        output.pop();

        if tick % 50 == 0 {
            let stats = network.bindings().stats();
            let speaker_stats = speaker.stats();
            tracing::info!(
                "Binding stats: {} announced, {} bound, {} pending, {} frames routed, {} dropped",
                stats.announced,
                stats.bound,
                stats.pending,
                stats.frames_routed,
                stats.frames_dropped
            );
            tracing::info!(
                "Speaker stats: {} links, {} unlinks, {} frames, {} overflows, {} underruns, buffer {:.0}% ({} ms)",
                speaker_stats.links,
                speaker_stats.unlinks,
                speaker_stats.frames_received,
                speaker_stats.overflows,
                speaker_stats.underruns,
                output.fill_level() * 100.0,
                speaker.buffer_lag_ms()
            );
        }
    }

    println!("{}", serde_json::to_string_pretty(&network.status())?);

    network.shutdown();
    network.service();
    network.unregister_endpoint(speaker.as_ref());

    tracing::info!("Voice session simulator stopped");
    Ok(())
}
