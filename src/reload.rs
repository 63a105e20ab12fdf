//! Boundary: invokes the downstream reload command as a subprocess.

use tokio::process::Command;

/// Runs `downstream_reload_command` through a shell, capturing and logging
/// its output. Failures are logged and otherwise ignored by the caller — a
/// failed reload leaves the newly written rule files in place and the
/// observer loop continues (§7, `ReloadFailure`).
pub struct Reloader {
    command: String,
}

impl Reloader {
    #[must_use]
    pub fn new(command: String) -> Self {
        Self { command }
    }

    /// Runs the reload command; returns whether it exited successfully.
    pub async fn reload(&self) -> bool {
        let output = match Command::new("sh").arg("-c").arg(&self.command).output().await {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(command = %self.command, error = %err, "failed to spawn reload command");
                return false;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            tracing::info!(command = %self.command, stdout = %stdout.trim(), "reload command succeeded");
            true
        } else {
            tracing::error!(
                command = %self.command,
                code = output.status.code().unwrap_or(-1),
                stdout = %stdout.trim(),
                stderr = %stderr.trim(),
                "reload command failed"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_reports_true() {
        let reloader = Reloader::new("true".to_string());
        assert!(reloader.reload().await);
    }

    #[tokio::test]
    async fn failing_command_reports_false() {
        let reloader = Reloader::new("false".to_string());
        assert!(!reloader.reload().await);
    }
}
