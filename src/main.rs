mod calc;
mod config;
mod critical;
mod diagnosis;
mod ipc;
mod model;
mod progress;
mod rank;
mod telemetry;

use anyhow::Context;
use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    let config = config::DaemonConfig::from_env().context("loading configuration")?;
    telemetry::init(&config)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        history_limit = config.history_limit,
        "scorebookd ready"
    );

    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("stdin closed: {}", e);
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
                tracing::warn!("unparseable request: {}", e);
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                writeln!(stdout, "{}", reply).context("writing response")?;
                stdout.flush().context("flushing response")?;
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        )
        .context("writing response")?;
        stdout.flush().context("flushing response")?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
