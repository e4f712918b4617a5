//! Follows one processing job over the real-time connection.
//!
//! Demonstrates:
//! - Building and connecting a client
//! - Tracking a job with [`JobTracker`]
//! - Watching connection quality
//! - Deliberate disconnect on Ctrl+C or job completion
//!
//! Usage:
//!   cargo run --example watch_job -- <url> <token> <job-id>
//!   cargo run --example watch_job -- ws://localhost:8000/ws dev-token job-1 --debug

// ============================================================================
// Imports
// ============================================================================

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

use docstream_realtime::{
    ConnectionMonitor, JobTracker, ProcessingJob, RealtimeClient, ReconnectPolicy,
};

// ============================================================================
// Args
// ============================================================================

struct Args {
    url: String,
    token: String,
    job_id: String,
    debug: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let debug = args.iter().any(|a| a == "--debug");
        let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

        let [url, token, job_id] = positional.as_slice() else {
            bail!("usage: watch_job <url> <token> <job-id> [--debug]");
        };

        Ok(Self {
            url: url.to_string(),
            token: token.to_string(),
            job_id: job_id.to_string(),
            debug,
        })
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "docstream_realtime=debug"
    } else {
        "docstream_realtime=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse()?;
    init_logging(args.debug);

    let client = RealtimeClient::builder()
        .url(&args.url)
        .reconnect_policy(ReconnectPolicy::new().with_max_attempts(5))
        .build()
        .context("invalid client configuration")?;

    let monitor = ConnectionMonitor::new(client.registry());
    let tracker = JobTracker::new(client.registry());
    tracker.track(ProcessingJob::new(&args.job_id));

    // Ask the server for pushes each time the link comes up.
    let requester = client.clone();
    let job_id = args.job_id.clone();
    let _on_open = client.subscribe_to_connection(move |data| {
        if data["status"] == "connected" {
            requester.request_job_updates(&job_id);
        }
    });

    println!("=== watch_job: {} ===\n", args.job_id);
    client.connect(args.token);

    let mut changes = tracker.changes();
    let mut quality = monitor.watch();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n[Ctrl+C] Disconnecting");
                break;
            }
            Ok(()) = quality.changed() => {
                println!("[connection] {}", *quality.borrow_and_update());
            }
            Ok(()) = changes.changed() => {
                let _ = changes.borrow_and_update();
                let Some(job) = tracker.get(&args.job_id) else {
                    continue;
                };
                println!(
                    "[job] {:?} {:>5.1}% stage={} docs={}",
                    job.status,
                    job.progress,
                    job.current_stage.as_deref().unwrap_or("-"),
                    job.documents_processed,
                );
                for error in &job.errors {
                    println!("      error: {error}");
                }
                if job.is_finished() {
                    println!("\n[done] Job finished");
                    break;
                }
            }
        }
    }

    client.disconnect();
    Ok(())
}
