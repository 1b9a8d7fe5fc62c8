//! LAN intercom endpoint
//!
//! Captures the local microphone, streams it to the peer over UDP and plays
//! the peer's audio through a jitter buffer. Run one instance on each machine
//! with the destination pointing at the other.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_intercom::{
    audio::{list_devices, IntercomStream},
    config::AppConfig,
    feedback::LogFeedback,
    network::UdpTransport,
    IntercomSession,
};

#[derive(Parser, Debug)]
#[command(name = "intercom", about = "Full-duplex LAN audio intercom")]
struct Cli {
    /// Chunks to buffer before playback starts
    #[arg(short = 'b', long)]
    chunks_to_buffer: Option<usize>,

    /// Frames per chunk
    #[arg(short = 's', long)]
    frames_per_chunk: Option<usize>,

    /// Sample rate in frames per second
    #[arg(short = 'r', long)]
    frames_per_second: Option<u32>,

    /// Interleaved channels per frame
    #[arg(short = 'c', long)]
    channels: Option<u16>,

    /// Local UDP port to receive on
    #[arg(short = 'p', long)]
    listening_port: Option<u16>,

    /// Peer UDP port to send to
    #[arg(short = 'i', long)]
    destination_port: Option<u16>,

    /// Peer host name or address
    #[arg(short = 'a', long)]
    destination_address: Option<String>,

    /// Config file (defaults to the per-user config location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Input device id, as printed by --list-devices
    #[arg(long)]
    input_device: Option<String>,

    /// Output device id, as printed by --list-devices
    #[arg(long)]
    output_device: Option<String>,

    /// Disable periodic link health logging
    #[arg(long)]
    no_feedback: bool,
}

impl Cli {
    /// Override config values with the flags that were given
    fn apply(&self, config: &mut AppConfig) {
        if let Some(v) = self.chunks_to_buffer {
            config.buffer.chunks_to_buffer = v;
        }
        if let Some(v) = self.frames_per_chunk {
            config.audio.frames_per_chunk = v;
        }
        if let Some(v) = self.frames_per_second {
            config.audio.frames_per_second = v;
        }
        if let Some(v) = self.channels {
            config.audio.channels = v;
        }
        if let Some(v) = self.listening_port {
            config.network.listening_port = v;
        }
        if let Some(v) = self.destination_port {
            config.network.destination_port = v;
        }
        if let Some(v) = &self.destination_address {
            config.network.destination_address = v.clone();
        }
        if let Some(v) = &self.input_device {
            config.audio.input_device = Some(v.clone());
        }
        if let Some(v) = &self.output_device {
            config.audio.output_device = Some(v.clone());
        }
        if self.no_feedback {
            config.feedback.enabled = false;
        }
    }
}

fn print_devices() {
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = if device.is_input { "Input" } else { "Output" };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading config")?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!("Starting LAN intercom");

    let transport = UdpTransport::from_config(&config.network)?;
    tracing::info!(
        "Listening on {}, sending to {}",
        transport.local_addr()?,
        transport.destination()
    );

    let session = IntercomSession::new(&config, transport)?;
    let feedback_task = session.reporter(&config).map(|r| r.spawn(LogFeedback));

    let IntercomSession {
        bridge,
        receiver,
        capture,
        ..
    } = session;
    let running = receiver.running();
    let receiver_handle = receiver.spawn().context("spawning receiver thread")?;

    let _stream = IntercomStream::start(&config.audio, bridge, capture)?;

    tracing::info!("Intercom running. Press Ctrl+C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watchdog = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down...");
                break;
            }
            _ = watchdog.tick() => {
                if receiver_handle.is_finished() {
                    tracing::error!("Receiver thread stopped");
                    break;
                }
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    if let Some(task) = feedback_task {
        task.abort();
    }

    if receiver_handle.is_finished() {
        match receiver_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e).context("receiver failed"),
            Err(_) => anyhow::bail!("receiver thread panicked"),
        }
    }

    Ok(())
}
