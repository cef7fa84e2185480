use clap::Parser;
use mockexamd::{ipc, ExamContext};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mockexamd")]
#[command(about = "Mock exam answer-key and grading sidecar")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "MOCKEXAM_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace directory to open at start-up
    #[arg(short, long)]
    workspace: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let ctx = match &args.config {
        Some(path) => ExamContext::load(path)?,
        None => ExamContext::default(),
    };

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&ctx.config().log_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let startup_workspace = args
        .workspace
        .clone()
        .or_else(|| ctx.config().workspace.clone());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        rounds = ctx.rounds().len(),
        subjects = ctx.catalog().subjects().len(),
        "mockexamd starting"
    );

    let mut state = ipc::AppState::new(ctx);
    if let Some(path) = startup_workspace {
        if let Err(e) = ipc::open_workspace(&mut state, path.clone()) {
            warn!(workspace = %path.to_string_lossy(), "failed to open workspace: {:#}", e);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    if let Some(store) = state.store.as_ref() {
        if let Err(e) = store.flush() {
            warn!("final flush failed: {}", e);
        }
    }
    info!("stdin closed, shutting down");
    Ok(())
}
