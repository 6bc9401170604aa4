use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use ui_target_core::element::format_elements;
use ui_target_core::service::{ElementService, discovery_response};
use ui_target_core::{DetectionMode, Settings, TargetOutcome, TargetQuery, UiTarget};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device serial; defaults to UI_TARGET_DEVICE or the only attached device
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the elements on screen
    Elements {
        /// tree, optical or auto (xml / ocr accepted)
        #[arg(short, long)]
        mode: Option<DetectionMode>,

        #[arg(short, long, default_value_t = false)]
        clickable_only: bool,

        /// Print the full JSON response instead of the summary
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Tap an element by index, text or resource id
    Tap {
        #[arg(short, long)]
        index: Option<usize>,

        #[arg(short, long)]
        text: Option<String>,

        #[arg(short, long)]
        resource_id: Option<String>,

        /// Require the whole text to match
        #[arg(long, default_value_t = false)]
        exact: bool,

        /// Require the whole resource id to match
        #[arg(long, default_value_t = false)]
        exact_id: bool,

        #[arg(short, long)]
        mode: Option<DetectionMode>,
    },
    /// Tap raw screen coordinates
    TapXy { x: i32, y: i32 },
    /// Save a JPEG screenshot
    Screenshot {
        #[arg(short, long, default_value = "screenshot.jpg")]
        output: PathBuf,

        /// Draw element boxes and indices
        #[arg(short, long)]
        annotated: Option<bool>,
    },
    /// Answer line-delimited JSON requests on stdin
    Serve,
    /// Show or change saved defaults
    Defaults {
        #[arg(short, long)]
        mode: Option<DetectionMode>,

        #[arg(long)]
        max_listed: Option<usize>,

        #[arg(long)]
        annotate: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(args.verbose);

    let target = UiTarget::new().context("Failed to load configuration")?;
    let device = args.device.as_deref();
    let service = target.service();

    match args.command {
        Command::Elements {
            mode,
            clickable_only,
            json,
        } => {
            let snapshot = service
                .discover(device, mode, clickable_only, true)
                .context("Failed to detect elements")?;
            if json {
                let response = discovery_response(&snapshot, service.settings().max_listed_elements);
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("Mode: {}", snapshot.mode);
                println!(
                    "{}",
                    format_elements(&snapshot.elements, service.settings().max_listed_elements)
                );
            }
        }
        Command::Tap {
            index,
            text,
            resource_id,
            exact,
            exact_id,
            mode,
        } => {
            let query = TargetQuery::from_keys(index, text, resource_id, exact, !exact_id)?;
            let report = service
                .tap_element(device, &query, mode, false)
                .context("Failed to tap element")?;
            match report.outcome {
                TargetOutcome::Found { element, x, y } => {
                    println!("Tapped {} at ({}, {})", element, x, y);
                }
                TargetOutcome::NotFound { available } => {
                    bail!(
                        "Element not found with {} ({} elements on screen)",
                        report.search_method,
                        available
                    );
                }
            }
        }
        Command::TapXy { x, y } => {
            service.tap(device, x, y).context("Failed to tap")?;
            println!("Tapped ({}, {})", x, y);
        }
        Command::Screenshot { output, annotated } => {
            let annotated = annotated.unwrap_or(service.settings().annotate_by_default);
            let jpeg = service
                .screenshot(device, annotated)
                .context("Failed to capture screenshot")?;
            std::fs::write(&output, &jpeg)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Saved {} ({} bytes)", output.display(), jpeg.len());
        }
        Command::Serve => serve(target.into_service()).await?,
        Command::Defaults {
            mode,
            max_listed,
            annotate,
        } => defaults(mode, max_listed, annotate)?,
    }

    Ok(())
}

/// Reads one JSON request per stdin line and writes one response per line.
///
/// Requests run on the blocking pool, so responses may come back out of
/// order; callers match them up by `id`.
async fn serve(service: ElementService) -> Result<()> {
    let service = Arc::new(service);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    info!("serving requests on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(request = %line, "received");
        let service = Arc::clone(&service);
        let tx = tx.clone();
        tokio::task::spawn_blocking(move || {
            let response = service.handle_line(&line);
            let _ = tx.send(response.to_string());
        });
    }

    // The writer finishes once every in-flight request has answered.
    drop(tx);
    writer.await??;
    info!("stdin closed, exiting");
    Ok(())
}

fn defaults(mode: Option<DetectionMode>, max_listed: Option<usize>, annotate: Option<bool>) -> Result<()> {
    let mut settings = Settings::load();
    let changed = mode.is_some() || max_listed.is_some() || annotate.is_some();
    if let Some(mode) = mode {
        settings.default_mode = mode;
    }
    if let Some(max_listed) = max_listed {
        settings.max_listed_elements = max_listed;
    }
    if let Some(annotate) = annotate {
        settings.annotate_by_default = annotate;
    }
    if changed {
        settings.save().context("Failed to save settings")?;
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    if let Some(path) = Settings::config_path() {
        println!("({})", path.display());
    }
    Ok(())
}

/// Logs go to stderr; stdout carries responses.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
