use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use shared::protocol::{GateSignal, GateSnapshot};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, watch},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use unlock_core::{DurableFlagStore, Effects, Gate, GateConfig, GateDeps};

mod commands;
mod settings;
mod view;

use commands::{decode_line, parse_line, ShellCommand, HELP};
use settings::{load_settings, prepare_database_url};
use view::{render_signal, render_status};

#[derive(Parser, Debug)]
#[command(about = "Terminal front-end for the three-stage unlock gate")]
struct Args {
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    log_filter: Option<String>,
    /// Print every snapshot as a JSON line.
    #[arg(long)]
    json_snapshots: bool,
    /// Forget that the first-unlock flourish already played.
    #[arg(long)]
    replay_flourish: bool,
}

struct TerminalEffects;

#[async_trait]
impl Effects for TerminalEffects {
    async fn play_flourish(&self) -> Result<()> {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(b"\x07")?;
        stdout.flush()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings()?;
    if let Some(v) = args.database_url {
        settings.database_url = v;
    }
    if let Some(v) = args.log_filter {
        settings.log_filter = v;
    }
    if args.json_snapshots {
        settings.json_snapshots = true;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let database_url = prepare_database_url(&settings.database_url);
    let flags = DurableFlagStore::initialize(&database_url).await?;
    if args.replay_flourish && flags.forget_flourish().await? {
        info!("first-unlock flourish flag cleared");
    }

    let deps = GateDeps::in_memory()
        .with_flags(Arc::new(flags))
        .with_effects(Arc::new(TerminalEffects));
    let gate = Gate::spawn(GateConfig::default(), deps)?;
    info!(%database_url, "gate shell ready");
    println!("{HELP}");

    let printer = tokio::spawn(print_signals(gate.subscribe()));
    let json_printer = settings
        .json_snapshots
        .then(|| tokio::spawn(print_snapshots(gate.watch())));

    let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');
    while let Some(raw) = lines.next_segment().await.context("failed to read stdin")? {
        let line = match decode_line(raw) {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, "skipping input line that is not valid UTF-8");
                continue;
            }
        };
        match parse_line(&line) {
            Ok(ShellCommand::Inputs(inputs)) => {
                for input in inputs {
                    gate.send(input)?;
                }
            }
            Ok(ShellCommand::Status) => println!("{}", render_status(&gate.snapshot())),
            Ok(ShellCommand::Help) => println!("{HELP}"),
            Ok(ShellCommand::Quit) => break,
            Err(error) => println!("{error}"),
        }
    }

    drop(gate);
    let _ = printer.await;
    if let Some(json_printer) = json_printer {
        let _ = json_printer.await;
    }
    Ok(())
}

async fn print_signals(mut signals: broadcast::Receiver<GateSignal>) {
    loop {
        match signals.recv().await {
            Ok(signal) => {
                if let Some(text) = render_signal(&signal) {
                    println!("{text}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "shell fell behind gate signals");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn print_snapshots(mut snapshots: watch::Receiver<GateSnapshot>) {
    while snapshots.changed().await.is_ok() {
        let line = serde_json::to_string(&*snapshots.borrow_and_update());
        match line {
            Ok(line) => println!("{line}"),
            Err(error) => warn!(%error, "failed to encode snapshot"),
        }
    }
}
