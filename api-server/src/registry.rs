// Session-keyed registry of live websocket transports. One transport per
// session; constructed once per server lifetime and handed to everything
// that needs to notify.
use axum::extract::ws::Message;
use boxoffice_common::{BoxofficeError, BroadcastMsg, NotificationMsg, Result};
use metrics::counter;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

pub type Transport = mpsc::UnboundedSender<Message>;

#[derive(Default)]
pub struct ConnectionRegistry {
    conns: RwLock<HashMap<String, Transport>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when a transport is already registered for the session; the
    /// newcomer never silently replaces a live connection.
    pub async fn register(&self, session_id: &str, transport: Transport) -> Result<()> {
        let mut conns = self.conns.write().await;
        if conns.contains_key(session_id) {
            return Err(BoxofficeError::ConnectionExists(session_id.to_string()));
        }
        conns.insert(session_id.to_string(), transport);
        Ok(())
    }

    pub async fn unregister(&self, session_id: &str) {
        self.conns.write().await.remove(session_id);
    }

    pub async fn active_sessions(&self) -> usize {
        self.conns.read().await.len()
    }

    /// Unicast to one session. Undelivered notifications are not retried
    /// or persisted; the caller decides what the failure means.
    pub async fn notify(&self, session_id: &str, msg: &NotificationMsg) -> Result<()> {
        let payload = Message::Text(serde_json::to_string(msg)?);
        let conns = self.conns.read().await;
        let transport = conns
            .get(session_id)
            .ok_or_else(|| BoxofficeError::NoActiveConnection(session_id.to_string()))?;
        transport
            .send(payload)
            .map_err(|_| BoxofficeError::NoActiveConnection(session_id.to_string()))
    }

    /// Best-effort fanout to every registered session. A dead transport is
    /// logged and skipped; it never blocks delivery to the rest. Returns
    /// the number of sessions the message was handed to.
    pub async fn broadcast(&self, msg: &BroadcastMsg) -> Result<usize> {
        let payload = serde_json::to_string(msg)?;
        let conns = self.conns.read().await;
        let mut delivered = 0;
        for (session_id, transport) in conns.iter() {
            if transport.send(Message::Text(payload.clone())).is_ok() {
                delivered += 1;
            } else {
                warn!("broadcast skipped dead transport for session {}", session_id);
                counter!("boxoffice_broadcast_failures_total").increment(1);
            }
        }
        Ok(delivered)
    }
}
