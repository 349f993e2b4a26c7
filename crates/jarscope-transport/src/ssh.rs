use std::path::Path;
use std::time::Duration;

use jarscope_util::errors::JarscopeError;
use jarscope_util::process::CommandBuilder;

use crate::listing::{decode_listing, parse_listing};
use crate::Listing;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Transport for a remote host, driving the system `ssh`/`scp` binaries
/// through `sshpass` for the stored password.
pub struct SshTransport {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SshTransport {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn user_at_host(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    fn connect_opt() -> String {
        format!("-oConnectTimeout={}", CONNECT_TIMEOUT.as_secs())
    }

    pub async fn list(&self, dir: &str) -> miette::Result<Listing> {
        let output = CommandBuilder::new("sshpass")
            .args(["-p", &self.password])
            .arg("ssh")
            .args(["-p", &self.port.to_string()])
            .arg(Self::connect_opt())
            .args(["-oStrictHostKeyChecking=no", "-oBatchMode=no"])
            .arg(self.user_at_host())
            .arg(format!("ls -l --time-style=full-iso {dir}"))
            .timeout(COMMAND_TIMEOUT)
            .exec()
            .await
            .map_err(|e| JarscopeError::Transport {
                message: format!("ssh to {} failed: {e}", self.user_at_host()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JarscopeError::Transport {
                message: format!(
                    "listing {dir} on {} failed: {}",
                    self.user_at_host(),
                    stderr.trim()
                ),
            }
            .into());
        }

        let text = decode_listing(&output.stdout)?;
        Ok(parse_listing(&text))
    }

    pub async fn list_recursive(&self, dir: &str) -> miette::Result<Listing> {
        let output = CommandBuilder::new("sshpass")
            .args(["-p", &self.password])
            .arg("ssh")
            .args(["-p", &self.port.to_string()])
            .arg(Self::connect_opt())
            .args(["-oStrictHostKeyChecking=no", "-oBatchMode=no"])
            .arg(self.user_at_host())
            .arg(format!("ls -lR --time-style=full-iso {dir}"))
            .timeout(COMMAND_TIMEOUT)
            .exec()
            .await
            .map_err(|e| JarscopeError::Transport {
                message: format!("ssh to {} failed: {e}", self.user_at_host()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JarscopeError::Transport {
                message: format!(
                    "recursive listing of {dir} on {} failed: {}",
                    self.user_at_host(),
                    stderr.trim()
                ),
            }
            .into());
        }

        let text = decode_listing(&output.stdout)?;
        Ok(crate::listing::parse_recursive_listing(&text, dir))
    }

    pub async fn fetch(&self, src: &str, dst: &Path) -> miette::Result<()> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(JarscopeError::Io)?;
        }

        let output = CommandBuilder::new("sshpass")
            .args(["-p", &self.password])
            .arg("scp")
            .args(["-P", &self.port.to_string()])
            .arg(Self::connect_opt())
            .arg("-oStrictHostKeyChecking=no")
            .arg(format!("{}:{src}", self.user_at_host()))
            .arg(dst.to_string_lossy().into_owned())
            .timeout(COMMAND_TIMEOUT)
            .exec()
            .await
            .map_err(|e| JarscopeError::Transport {
                message: format!("scp from {} failed: {e}", self.user_at_host()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JarscopeError::Transport {
                message: format!(
                    "fetching {src} from {} failed: {}",
                    self.user_at_host(),
                    stderr.trim()
                ),
            }
            .into());
        }
        Ok(())
    }
}
