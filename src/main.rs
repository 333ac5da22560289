mod cli;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use fp_av::{FfmpegProber, Prober, ToolRegistry};
use fp_core::config::Config;
use framepump::{MediaBackend, PlaybackConfig, PlaybackEvent, Player};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;

async fn play(playback: PlaybackConfig, output: &Path, config: &Config) -> Result<()> {
    let backend = MediaBackend::ffmpeg(&config.tools)
        .await
        .context("Failed to initialise the ffmpeg backend")?;
    let looping = playback.looping;
    let player = Player::open_with_events(playback, backend, &config.events)
        .await
        .context("Failed to open source")?;

    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = if output == Path::new("-") {
        Box::new(tokio::io::stdout())
    } else {
        Box::new(
            tokio::fs::File::create(output)
                .await
                .with_context(|| format!("Failed to create output file {}", output.display()))?,
        )
    };

    let mut events = player.subscribe();
    player.start().await.context("Failed to start playback")?;
    if let Some(session) = player.session() {
        tracing::info!(
            "Playing {} as {} ({})",
            player.source_path().display(),
            player.config().pixel_format,
            session.geometry
        );
    }

    let started = Instant::now();
    let mut frames = 0u64;
    let mut bytes = 0u64;
    let mut failure = None;
    let mut interrupted = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                tracing::info!("Interrupted, stopping playback");
                interrupted = true;
                player.stop();
            }
            event = events.recv() => match event {
                Ok(PlaybackEvent::Frame(frame)) => {
                    sink.write_all(frame.data()).await.context("Failed to write frame")?;
                    frames += 1;
                    bytes += frame.len() as u64;
                }
                Ok(PlaybackEvent::End(code)) => {
                    tracing::info!("Playback ended (exit code {code:?})");
                    if !looping {
                        break;
                    }
                }
                Ok(PlaybackEvent::Error(message)) => {
                    failure = Some(message);
                    break;
                }
                Ok(PlaybackEvent::Stop) => break,
                Ok(PlaybackEvent::Pause | PlaybackEvent::Resume) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Output fell behind; {skipped} events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    sink.flush().await.context("Failed to flush output")?;
    player.stop();

    tracing::info!(
        "Wrote {frames} frames ({bytes} bytes) in {:.2?}",
        started.elapsed()
    );
    match failure {
        Some(message) => anyhow::bail!("Playback failed: {message}"),
        None => Ok(()),
    }
}

async fn probe_file(file: &Path, json: bool, config: &Config) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let registry = ToolRegistry::discover(&config.tools);
    let prober = FfmpegProber::from_registry(&registry)?;
    let metadata = prober.probe_source(file).await?;

    if json {
        let json_str = serde_json::to_string_pretty(&metadata)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", file.display());
        println!("Format: {}", metadata.format_name);
        println!("Size: {}x{}", metadata.width, metadata.height);
        println!("Frame rate: {:.3} fps", metadata.fps);
        match metadata.total_frames {
            Some(total) => println!("Frames: {}", total),
            None => println!("Frames: unknown"),
        }
        println!("Still image: {}", if metadata.is_image { "yes" } else { "no" });
    }

    Ok(())
}

async fn list_formats(config: &Config) -> Result<()> {
    let registry = ToolRegistry::discover(&config.tools);
    let prober = FfmpegProber::from_registry(&registry)?;
    let formats = prober.list_formats().await?;

    println!("{:<20} BITS_PER_PIXEL", "NAME");
    for format in formats.iter() {
        match format.bits_per_pixel {
            Some(bits) => println!("{:<20} {}", format.name, bits),
            None => println!("{:<20} ?", format.name),
        }
    }
    println!("\n{} formats", formats.len());

    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg (which ships ffprobe) to play sources.");
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "framepump=trace,fp_av=debug,fp_core=debug,ffmpeg=info".to_string()
        } else {
            "framepump=info,fp_av=info,fp_core=info,ffmpeg=info".to_string()
        }
    });

    // Frames may go to stdout, so logs always go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config.as_deref());
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Play {
            source,
            mode,
            width,
            height,
            speed,
            fps,
            looping,
            debug,
            start,
            end,
            output,
        } => {
            let playback = PlaybackConfig {
                debug,
                width,
                height,
                speed,
                looping,
                start_time: start,
                end_time: end,
                fps,
                ..PlaybackConfig::new(source, mode)
            };
            rt.block_on(play(playback, &output, &config))
        }
        Commands::Probe { file, json } => rt.block_on(probe_file(&file, json, &config)),
        Commands::Formats => rt.block_on(list_formats(&config)),
        Commands::CheckTools => check_tools(&config),
    }
}
