//! Replay command
//!
//! Feeds recorded webhook payloads through a local relay. Replies come from
//! the echo responder and are printed instead of being sent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use owo_colors::OwoColorize;
use relay::{
    Deliverer, DeliveryStatus, EchoResponder, OutgoingMessage, Relay, RelayConfig,
    WebhookPayload, WebhookResponse,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Poll interval while waiting for pending bursts to fire
const IDLE_POLL: Duration = Duration::from_millis(50);

/// One line of a replay file
#[derive(Debug, Deserialize)]
struct ReplayEntry {
    /// Pause before this payload is delivered
    #[serde(default)]
    after_ms: u64,
    payload: WebhookPayload,
}

/// Parse a JSON lines replay file; blank lines and `#` comments are skipped
fn parse_entries(content: &str) -> Result<Vec<ReplayEntry>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid replay entry on line {}", index + 1))
        })
        .collect()
}

/// Prints deliveries to stdout
#[derive(Default)]
struct ConsoleDeliverer {
    delivered: AtomicUsize,
}

#[async_trait]
impl Deliverer for ConsoleDeliverer {
    async fn deliver(&self, message: OutgoingMessage) -> relay::Result<DeliveryStatus> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        println!(
            "{} {} {}: {}",
            "→".green(),
            message.conversation_id.bold(),
            format!("({})", message.user_email).dimmed(),
            message.message
        );
        Ok(DeliveryStatus::ok())
    }
}

pub async fn run(
    config_path: Option<&Path>,
    file: &Path,
    sync: bool,
    delay_ms: Option<u64>,
) -> Result<()> {
    let mut config = RelayConfig::load(config_path)?;
    if let Some(delay_ms) = delay_ms {
        config.debounce.delay_ms = delay_ms;
        config.validate()?;
    }

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read replay file: {}", file.display()))?;
    let entries = parse_entries(&content)?;

    let deliverer = Arc::new(ConsoleDeliverer::default());
    let relay = Relay::new(&config, Arc::new(EchoResponder), deliverer.clone());

    println!(
        "{} {} payload(s) from {} {}",
        "Replaying".bold(),
        entries.len(),
        file.display(),
        format!("(delay: {}ms, {})", config.debounce.delay_ms, if sync { "sync" } else { "async" })
            .dimmed()
    );

    let mut waiting = Vec::new();
    for entry in entries {
        if entry.after_ms > 0 {
            tokio::time::sleep(Duration::from_millis(entry.after_ms)).await;
        }

        if sync {
            waiting.push(relay.receive_waiting(&entry.payload)?);
        } else {
            print_response(&relay.receive(&entry.payload)?)?;
        }
    }

    if sync {
        for reply in waiting {
            print_response(&reply.wait().await?)?;
        }
    } else {
        wait_for_idle(&relay).await;
    }

    let cancelled = relay.shutdown();
    println!(
        "\n{} {} reply(ies) delivered, {} burst(s) cancelled",
        "Done:".bold(),
        deliverer.delivered.load(Ordering::SeqCst),
        cancelled
    );
    Ok(())
}

/// Wait until no burst is pending and every fired burst has been answered
async fn wait_for_idle(relay: &Relay) {
    loop {
        let health = relay.health();
        if health.pending_messages == 0 && health.processing == 0 {
            break;
        }
        debug!(
            "Waiting for {} pending and {} processing burst(s)",
            health.pending_messages, health.processing
        );
        tokio::time::sleep(IDLE_POLL).await;
    }
}

fn print_response(response: &WebhookResponse) -> Result<()> {
    let json = serde_json::to_string(response).context("Failed to serialize response")?;
    println!("{} {}", "←".cyan(), json.dimmed());
    Ok(())
}
