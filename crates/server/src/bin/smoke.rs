// End-to-end smoke check against a running docket server
//
// Usage: DOCKET_URL=http://localhost:3001 cargo run --bin docket-smoke
//
// Checks /healthz, submits a summarize task and polls until it is terminal.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use docket_core::{TaskKind, TaskStatus};
use docket_server::TaskClient;
use serde_json::json;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEADLINE: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let base_url = std::env::var("DOCKET_URL").unwrap_or_else(|_| "http://localhost:3001".to_string());
    let client = TaskClient::new(&base_url);

    let health = client.health().await.context("Health check failed")?;
    println!("health: {} v{} (up {:.1}s)", health.name, health.version, health.uptime);

    let handle = client
        .submit(
            TaskKind::Summarize,
            json!({ "text": "Docket accepts tasks over HTTP, queues them durably and runs them on a bounded worker pool." }),
            Some("docket-smoke"),
        )
        .await
        .context("Submit failed")?;
    println!("submitted: {} (correlation {})", handle.id, handle.correlation_id);

    let record = client
        .wait_for_completion(handle.id, POLL_INTERVAL, DEADLINE)
        .await
        .context("Task did not finish")?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    if record.status != TaskStatus::Completed {
        bail!("task ended {}: {}", record.status, record.error.unwrap_or_default());
    }
    Ok(())
}
