//! Instant messages

use tracing::{info, warn};

use super::SipPhone;
use crate::error::ClientResult;
use crate::types::ReceivedMessage;
use crate::uri::SipUri;

impl SipPhone {
    /// Send an instant message to `destination`
    pub async fn send_message(&self, destination: &str, body: &str) -> ClientResult<()> {
        let endpoint = self.endpoint()?;
        let target = SipUri::parse(destination)?;
        match endpoint.send_message(&target, body).await {
            Ok(()) => {
                info!(to = %target, len = body.len(), "Message sent");
                Ok(())
            }
            Err(e) => {
                warn!(to = %target, error = %e, "Message failed");
                Err(e)
            }
        }
    }

    /// Received messages, newest first
    pub fn messages(&self) -> Vec<ReceivedMessage> {
        self.inner.inbox.lock().iter().cloned().collect()
    }

    pub fn clear_messages(&self) {
        self.inner.inbox.lock().clear();
    }
}
