//! Send command - deliver one message over the realtime channel.

use std::time::Duration;

use console::style;
use serde_json::json;

use pd_core::config::ConfigHandle;
use pd_core::error::{PdError, PdResult};
use pd_realtime::{ConnectionState, RealtimeSession};

use super::Target;
use crate::OutputFormat;

/// Run the send command.
pub async fn run(
    config: ConfigHandle,
    target: Target,
    to: String,
    content: String,
    wait_secs: u64,
    format: OutputFormat,
) -> PdResult<()> {
    let identity = super::resolve_target(&config, target, false).await?;
    let session = super::create_session(&config).await;
    session.bind(identity).await?;

    let result = deliver(&session, &to, &content, Duration::from_secs(wait_secs)).await;
    session.unbind().await;
    let message = result?;

    match format {
        OutputFormat::Text => println!(
            "  {} Sent to {}: {}",
            style("OK").green().bold(),
            message.to_user_id,
            super::truncate(&message.content, 60)
        ),
        OutputFormat::Json => println!("{}", json!({ "sent": message })),
    }
    Ok(())
}

async fn deliver(
    session: &RealtimeSession,
    to: &str,
    content: &str,
    wait: Duration,
) -> PdResult<pd_models::Message> {
    wait_until_connected(session, wait).await?;
    session.send_message(to, content).await
}

/// Wait for `Connected`, failing early if the binding is closed.
pub async fn wait_until_connected(session: &RealtimeSession, wait: Duration) -> PdResult<()> {
    let mut rx = session.state_receiver();
    let reached = tokio::time::timeout(
        wait,
        rx.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed)),
    )
    .await
    .map_err(|_| PdError::Timeout(format!("channel not connected after {}s", wait.as_secs())))?
    .map_err(|_| PdError::NotConnected)?;

    match *reached {
        ConnectionState::Connected => Ok(()),
        _ => Err(PdError::NotConnected),
    }
}
