//! The decoder child process is a resource owned by the Supervisor. This
//! guard's `Drop` kills it on every exit path — panics, fatal bringup
//! errors, and ordinary shutdown alike (§9 "Child process lifetime").

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::DECODER_KILL_GRACE_SECS;

pub struct DecoderProcess {
    child: Option<Child>,
}

impl DecoderProcess {
    pub fn spawn(executable: &str, command_args: &str) -> Result<Self> {
        let mut command = Command::new(executable);
        if !command_args.is_empty() {
            command.args(command_args.split_whitespace());
        }

        let child = command
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch decoder executable {executable}"))?;

        info!(executable, command_args, "decoder process launched");

        Ok(Self { child: Some(child) })
    }

    /// Terminates the child with a grace period before force-kill (§4.6, §5).
    pub async fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: sending SIGTERM to our own freshly-spawned child pid.
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }
        }

        match tokio::time::timeout(
            Duration::from_secs(DECODER_KILL_GRACE_SECS),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => info!(?status, "decoder process exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting on decoder process"),
            Err(_) => {
                warn!("decoder did not exit within grace period, force-killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to force-kill decoder process");
                }
            }
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            // kill_on_drop handles the actual signal; this just avoids a
            // zombie if `shutdown()` was never called (panic unwind path).
            drop(child);
        }
    }
}

