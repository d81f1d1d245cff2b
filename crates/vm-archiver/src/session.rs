use crate::config::{ENV_XO_HOST, ENV_XO_USER, XoSettings};
use crate::error::{Error, Result};
use crate::xo::ControlPlane;

/// Process-wide control-plane session. There is no teardown; the token
/// registered by the CLI client outlives the process until its ttl expires.
#[derive(Debug, Clone)]
pub struct Session {
    cfg: XoSettings,
}

impl Session {
    pub fn new(cfg: XoSettings) -> Self {
        Self { cfg }
    }

    /// Renews the session unless the control plane already answers.
    pub fn ensure(&self, cp: &dyn ControlPlane) -> Result<()> {
        let host = self
            .cfg
            .host
            .as_deref()
            .ok_or_else(|| Error::ConfigurationMissing(format!("{ENV_XO_HOST} is not set")))?;
        let user = self
            .cfg
            .user
            .as_deref()
            .ok_or_else(|| Error::ConfigurationMissing(format!("{ENV_XO_USER} is not set")))?;

        if cp.is_connected() {
            return Ok(());
        }

        tracing::info!(host, user, ttl = %self.cfg.session_ttl, "registering control-plane session");
        cp.register(host, user, self.cfg.password.as_deref(), &self.cfg.session_ttl)
            .map_err(|e| Error::Session(format!("registration with {host} failed: {e}")))?;

        if !cp.is_connected() {
            return Err(Error::Session(format!(
                "registered with {host} but the session is still not usable"
            )));
        }
        Ok(())
    }
}
