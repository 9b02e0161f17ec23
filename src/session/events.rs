//! Control event reporting.
//!
//! Logs each control event the downlink forwards and, after each one, the
//! order the backend holds for this call. Nothing here can end the session:
//! backend failures are logged and the next event is awaited.

use crate::agent::protocol::{ControlEvent, ControlMessage};
use crate::backend::{BackendClient, SessionId};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Report events until the downlink drops its sender.
pub async fn report(
    backend: &BackendClient,
    session_id: &SessionId,
    mut events: UnboundedReceiver<ControlMessage>,
) {
    while let Some(message) = events.recv().await {
        log_event(&message);

        match backend.get_call(session_id).await {
            Ok(call) => info!(session_id = %session_id, order = %call.order_summary(), "Order status"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Could not fetch order status"),
        }
    }

    debug!("Event channel closed");
}

fn log_event(message: &ControlMessage) {
    match &message.event {
        ControlEvent::ConversationText { role, content } => {
            info!(role = %role, content = %content, "Conversation")
        }
        ControlEvent::Error { description } => warn!(description = %description, "Agent error"),
        ControlEvent::Other(tag) => debug!(tag = %tag, raw = %message.raw, "Unhandled agent event"),
        _ => info!(event = message.tag(), "Agent event"),
    }
}
