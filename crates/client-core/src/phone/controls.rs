//! In-call controls: DTMF, hold, mute and transfer

use tracing::{debug, info};

use super::SipPhone;
use crate::error::ClientResult;
use crate::types::validate_dtmf_tone;
use crate::uri::SipUri;

impl SipPhone {
    /// Send one DTMF tone (`0-9`, `A-D`, `#`, `*`, or `,` for a pause)
    pub async fn send_dtmf(&self, tone: &str) -> ClientResult<()> {
        let session = self.active_session()?;
        let tone = validate_dtmf_tone(tone)?;
        debug!(call_id = %session.id(), tone = %tone, "Sending DTMF");
        session.send_dtmf(tone, self.inner.config.dtmf_duration).await
    }

    pub async fn hold(&self) -> ClientResult<()> {
        self.set_hold(true).await
    }

    pub async fn unhold(&self) -> ClientResult<()> {
        self.set_hold(false).await
    }

    async fn set_hold(&self, hold: bool) -> ClientResult<()> {
        let session = self.active_session()?;
        session.set_hold(hold).await?;
        info!(call_id = %session.id(), hold, "Hold state changed");
        self.inner.update(|s| s.is_held = hold);
        Ok(())
    }

    pub async fn mute(&self) -> ClientResult<()> {
        self.set_muted(true).await
    }

    pub async fn unmute(&self) -> ClientResult<()> {
        self.set_muted(false).await
    }

    async fn set_muted(&self, muted: bool) -> ClientResult<()> {
        let session = self.active_session()?;
        session.set_muted(muted).await?;
        info!(call_id = %session.id(), muted, "Mute state changed");
        self.inner.update(|s| s.is_muted = muted);
        Ok(())
    }

    /// Blind transfer of the current call
    pub async fn transfer(&self, target: &str) -> ClientResult<()> {
        let session = self.active_session()?;
        let target = SipUri::parse(target)?;
        info!(call_id = %session.id(), target = %target, "Transferring call");
        session.refer(&target).await
    }
}
