//! Connect command - bind to a user and stream realtime events.

use std::path::PathBuf;

use console::style;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use pd_core::config::ConfigHandle;
use pd_core::error::PdResult;
use pd_realtime::{ConnectionState, RealtimeEvent};

use super::Target;
use crate::OutputFormat;

/// Run the connect command.
pub async fn run(
    config: ConfigHandle,
    target: Target,
    save_config: bool,
    config_path: Option<PathBuf>,
    format: OutputFormat,
) -> PdResult<()> {
    let identity = super::resolve_target(&config, target, true).await?;
    let origin = config.read().await.server.origin.clone();
    let text = format == OutputFormat::Text;

    if save_config {
        let path = super::config_path(config_path)?;
        config.read().await.save_to_file(&path)?;
        if text {
            println!("  {} Config saved to {}", style("OK").green(), path.display());
        }
    }

    if text {
        println!(
            "{} Binding {} to {}...",
            style("[1/3]").bold().dim(),
            identity.user_id,
            origin
        );
    }
    let session = super::create_session(&config).await;
    let mut rx = session.subscribe();
    let epoch = session.bind(identity).await?;
    if text {
        println!("  {} Bound (epoch {epoch}).", style("OK").green().bold());
        println!(
            "{} Loading pending friend requests...",
            style("[2/3]").bold().dim(),
        );
    }

    // The live channel is still useful without the snapshot.
    let api = super::create_api_client(&config).await?;
    match session.hydrate_from(&api).await {
        Ok(Some(summary)) if text => println!(
            "  {} {} new, {} refreshed.",
            style("OK").green().bold(),
            summary.inserted,
            summary.replaced
        ),
        Ok(None) if text => println!("  {} Snapshot was superseded.", style("SKIP").yellow()),
        Ok(_) => {}
        Err(e) => {
            warn!("friend request snapshot failed: {e}");
            if text {
                println!("  {} Could not load friend requests: {e}", style("FAIL").red().bold());
            }
        }
    }

    if text {
        println!(
            "{} Listening for events... (Ctrl+C to stop)",
            style("[3/3]").bold().dim(),
        );
        println!();
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => match format {
                        OutputFormat::Text => println!(
                            "  {} {}",
                            style(format!("[{}]", ev.label())).cyan(),
                            describe(&ev)
                        ),
                        OutputFormat::Json => println!("{}", event_json(&ev)),
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!("event consumer lagged by {n}");
                        if text {
                            println!("  {} Missed {n} events (slow consumer)", style("WARN").yellow());
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if text {
                    println!("\n  Disconnecting...");
                }
                break;
            }
        }
    }

    session.unbind().await;
    Ok(())
}

/// One-line human summary of an event.
pub fn describe(event: &RealtimeEvent) -> String {
    match event {
        RealtimeEvent::StateChanged(state) => state.to_string(),
        RealtimeEvent::MessageReceived(m) => format!(
            "{} -> {}: {}",
            m.from_user_id,
            m.to_user_id,
            super::truncate(&m.content, 80)
        ),
        RealtimeEvent::MessageConfirmed { message, .. } => {
            format!("delivered to {}", message.to_user_id)
        }
        RealtimeEvent::FriendRequestReceived(req) => {
            format!("{} from {} ({})", req.id, req.from_user.label(), req.status)
        }
        RealtimeEvent::FriendRequestUpdated { request_id, status } => {
            format!("{request_id} is now {status}")
        }
        RealtimeEvent::FriendRequestsHydrated { inserted, replaced } => {
            format!("{inserted} new, {replaced} refreshed")
        }
        RealtimeEvent::PresenceChanged(p) => format!(
            "{} is {}",
            p.user_id,
            if p.is_online { "online" } else { "offline" }
        ),
        RealtimeEvent::AuthRejected { reason, consecutive } => {
            format!("rejected {consecutive} times in a row: {reason}")
        }
    }
}

/// Machine-readable form of an event.
pub fn event_json(event: &RealtimeEvent) -> Value {
    let data = match event {
        RealtimeEvent::StateChanged(state) => state_json(state),
        RealtimeEvent::MessageReceived(m) => json!(m),
        RealtimeEvent::MessageConfirmed { local_ref, message } => {
            json!({ "localRef": local_ref.to_string(), "message": message })
        }
        RealtimeEvent::FriendRequestReceived(req) => json!(req),
        RealtimeEvent::FriendRequestUpdated { request_id, status } => {
            json!({ "requestId": request_id, "status": status })
        }
        RealtimeEvent::FriendRequestsHydrated { inserted, replaced } => {
            json!({ "inserted": inserted, "replaced": replaced })
        }
        RealtimeEvent::PresenceChanged(p) => json!(p),
        RealtimeEvent::AuthRejected { reason, consecutive } => {
            json!({ "reason": reason, "consecutive": consecutive })
        }
    };
    json!({ "event": event.label(), "data": data })
}

fn state_json(state: &ConnectionState) -> Value {
    match state {
        ConnectionState::Reconnecting { attempt, delay } => json!({
            "state": state.label(),
            "attempt": attempt,
            "delayMs": delay.as_millis() as u64,
        }),
        other => json!({ "state": other.label() }),
    }
}
