//! Registration lifecycle

use tracing::{info, warn};

use super::{pump, EndpointSlot, SipPhone};
use crate::error::ClientResult;
use crate::recovery::{best_effort, with_timeout};
use crate::types::Credentials;

impl SipPhone {
    /// Register `credentials`, replacing any existing registration.
    ///
    /// Creates an endpoint, starts its event pump, connects the transport
    /// and registers, all within the configured registration timeout. On
    /// failure the half-built endpoint is released and the error returned.
    pub async fn register(&self, credentials: Credentials) -> ClientResult<()> {
        credentials.validate()?;

        if self.inner.endpoint.lock().is_some() {
            info!("Replacing existing registration");
            self.unregister().await?;
        }

        let (endpoint, events) = match self.backend.create_endpoint(&credentials) {
            Ok(created) => created,
            Err(e) => {
                self.inner.update(|s| s.last_error = Some(e.to_string()));
                return Err(e);
            }
        };
        let pump = tokio::spawn(pump::run_endpoint_pump(self.inner.clone(), events));
        *self.inner.endpoint.lock() = Some(EndpointSlot {
            endpoint: endpoint.clone(),
            credentials: credentials.clone(),
            pump,
        });

        let attempt = async {
            endpoint.connect().await?;
            endpoint.register().await
        };
        match with_timeout("register", self.inner.config.register_timeout, attempt).await {
            Ok(()) => {
                self.inner.update(|s| {
                    s.is_registered = true;
                    s.is_connected = true;
                    s.last_error = None;
                });
                info!(identity = %credentials.uri, server = %credentials.ws_servers, "Registered");
                Ok(())
            }
            Err(e) => {
                warn!(identity = %credentials.uri, error = %e, "Registration failed");
                if let Some(slot) = self.inner.endpoint.lock().take() {
                    slot.pump.abort();
                }
                best_effort("release", self.inner.config.teardown_timeout, endpoint.release()).await;
                self.inner.update(|s| {
                    s.is_registered = false;
                    s.is_connected = false;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Drop the registration and release the endpoint.
    ///
    /// Every step is best effort. Any call in progress is abandoned.
    pub async fn unregister(&self) -> ClientResult<()> {
        let Some(slot) = self.inner.endpoint.lock().take() else {
            return Ok(());
        };
        slot.pump.abort();

        let timeout = self.inner.config.teardown_timeout;
        let sessions: Vec<_> = [self.inner.active_call.lock().take(), self.inner.incoming_call.lock().take()]
            .into_iter()
            .flatten()
            .collect();
        for session in sessions {
            best_effort("terminate", timeout, session.terminate()).await;
        }
        best_effort("unregister", timeout, slot.endpoint.unregister()).await;
        best_effort("release", timeout, slot.endpoint.release()).await;

        self.inner.update(|s| {
            *s = Default::default();
        });
        self.inner.emit(super::PhoneEvent::RegistrationChanged { registered: false });
        info!(identity = %slot.credentials.uri, "Unregistered");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.inner.status.borrow().is_registered
    }
}
