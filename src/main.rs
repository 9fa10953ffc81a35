use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_gate::voice::normalize::calculate_rms;
use voice_gate::voice::{AudioCapture, AudioSource, SharedRollingBuffer, chunk_channel};
use voice_gate::{Config, Daemon, actuator};

/// Voice Gate - wake-word voice commands, verified by speaker, sent to an actuator
#[derive(Parser)]
#[command(name = "voicegate", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/voice-gate/config.toml)
    #[arg(short, long, env = "VOICE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Print the resolved configuration
    CheckConfig,
    /// Send one command to the actuator
    TestActuator {
        /// Canonical command (forward, backward, left, right, stop)
        command: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_gate=info",
        1 => "info,voice_gate=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Cmd::TestMic { duration } => test_mic(&config, duration).await,
            Cmd::CheckConfig => {
                check_config(&config);
                Ok(())
            }
            Cmd::TestActuator { command } => test_actuator(&config, &command),
        };
    }

    tracing::debug!(?config, "loaded configuration");
    tracing::info!("starting voice gate");

    Daemon::new(config).run().await?;
    Ok(())
}

/// Print a live RMS meter for the configured input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let format = config.audio.format;
    let rolling = SharedRollingBuffer::new(Duration::ZERO, format);
    let (sink, mut chunks, _errors) = chunk_channel(config.audio.queue_capacity, rolling);

    let mut capture = AudioCapture::new(format, config.audio.chunk_frames)?;
    capture.start(sink)?;

    println!("Sample rate: {} Hz", format.sample_rate);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Some(chunk) = chunks.try_recv() {
            samples.extend(chunk.samples().iter().map(|&s| voice_gate::voice::i16_to_f32(s)));
        }
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!(
        "Speech should sit above the recognizer threshold ({:.3}).",
        config.recognizer.energy_threshold
    );
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Is the right input device selected as default?");
    println!("  3. Does the device support {} Hz?", format.sample_rate);

    Ok(())
}

fn check_config(config: &Config) {
    let secs = |d: Duration| d.as_secs_f64();

    println!("Audio");
    println!("  sample rate:      {} Hz", config.audio.format.sample_rate);
    println!("  channels:         {}", config.audio.format.channels);
    println!("  chunk frames:     {}", config.audio.chunk_frames);
    println!("  queue capacity:   {}", config.audio.queue_capacity);
    println!("Session");
    println!("  wake phrase:      {:?}", config.wake_phrase);
    println!("  end phrase:       {:?}", config.end_phrase);
    println!("  pre-roll:         {:.2}s", secs(config.session.pre_roll));
    println!("  post-roll:        {:.2}s", secs(config.session.post_roll));
    println!("  min accept:       {:.2}s", secs(config.session.min_accept));
    println!("  max segment:      {:.2}s", secs(config.session.max_segment));
    println!("  cooldown:         {:.2}s", secs(config.session.cooldown));
    println!("  session gap:      {:.2}s", secs(config.session.inter_session_gap));
    println!("  session timeout:  {:.2}s", secs(config.session.session_timeout));
    println!("Vocabulary");
    for (phrase, command) in config.vocabulary.iter() {
        println!("  {phrase:<16}  → {command}");
    }
    println!("Verification");
    println!(
        "  reference voice:  {}",
        config.verification.reference_voice.display()
    );
    println!("  threshold:        {}", config.verification.threshold);
    println!("  min verify:       {:.2}s", secs(config.verification.min_verify));
    println!("  workers:          {}", config.verification.workers);
    println!(
        "  verifier url:     {}",
        config.verification.verifier_url.as_deref().unwrap_or("(not set)")
    );
    println!("Recognizer");
    println!("  provider:         {:?}", config.recognizer.provider);
    println!("  model:            {}", config.recognizer.model);
    println!(
        "  api key:          {}",
        if config.api_keys.openai.is_some() || config.api_keys.deepgram.is_some() {
            "set"
        } else {
            "(not set)"
        }
    );
    println!("Actuator");
    println!(
        "  port:             {}",
        config
            .actuator
            .port
            .as_ref()
            .map_or_else(|| "(not set)".to_string(), |p| p.display().to_string())
    );
    println!("  baud:             {}", config.actuator.baud);
    println!(
        "  boot delay:       {:.1}s",
        config.actuator.boot_delay.as_secs_f64()
    );
    println!("  simulate:         {}", config.actuator.simulate);
    if let Some(path) = &config.audit_log {
        println!("Audit log:          {}", path.display());
    }
}

fn test_actuator(config: &Config, command: &str) -> anyhow::Result<()> {
    let command: voice_gate::Command = command.parse()?;
    let mut gateway = actuator::connect(&config.actuator);

    println!("Sending {command:?} via {}", gateway.describe());
    gateway.send(command)?;
    println!("Sent.");
    Ok(())
}
