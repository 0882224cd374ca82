//! Post-scaffold dependency installation
//!
//! Runs the product's install command (e.g. `npm install`) in the composed
//! project, streaming its output through the log.

use crate::product::ProductConfig;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}")]
    Failed { command: String, code: i32 },

    #[error("`{command}` timed out after {} seconds", limit.as_secs())]
    TimedOut { command: String, limit: Duration },
}

/// Installs dependencies for a composed project directory
pub trait DependencyInstaller: Send + Sync {
    fn install(&self, directory: &Path) -> impl Future<Output = Result<(), InstallError>> + Send;
}

impl<T: DependencyInstaller> DependencyInstaller for &T {
    fn install(&self, directory: &Path) -> impl Future<Output = Result<(), InstallError>> + Send {
        (**self).install(directory)
    }
}

/// Installer that runs an external command in the project directory
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// `npm install`
    pub fn npm() -> Self {
        Self::new("npm", vec!["install".to_string()])
    }

    /// Use the product's install command, falling back to `npm install`
    pub fn from_config<C: ProductConfig>(config: &C) -> Self {
        match config.install_command().split_first() {
            Some((program, args)) => {
                Self::new(*program, args.iter().map(|a| a.to_string()).collect())
            }
            None => Self::npm(),
        }
    }

    /// Kill the command if it runs longer than `limit`
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// The command line as shown to users
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl DependencyInstaller for CommandInstaller {
    async fn install(&self, directory: &Path) -> Result<(), InstallError> {
        let command = self.command_line();
        tracing::info!(%command, directory = %directory.display(), "Installing dependencies");

        let mut child = TokioCommand::new(&self.program)
            .args(&self.args)
            .current_dir(directory)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InstallError::Spawn {
                command: command.clone(),
                source: e,
            })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, "stdout")));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, "stderr")));

        let waited = match self.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(InstallError::TimedOut { command, limit });
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|e| InstallError::Wait {
            command: command.clone(),
            source: e,
        })?;

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        if status.success() {
            Ok(())
        } else {
            Err(InstallError::Failed {
                command,
                code: status.code().unwrap_or(-1),
            })
        }
    }
}

/// Installer output is progress chatter (`npm WARN` included), so both streams log at info.
/// Failure is reported from the exit status.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "install", stream, "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Error reading installer output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing::Level;

    #[test]
    fn test_command_line() {
        assert_eq!(CommandInstaller::npm().command_line(), "npm install");
        let yarn = CommandInstaller::new("yarn", vec![]);
        assert_eq!(yarn.command_line(), "yarn");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_success_runs_in_directory() {
        let dir = TempDir::new().unwrap();
        let installer = CommandInstaller::new(
            "sh",
            vec!["-c".to_string(), "touch installed.marker".to_string()],
        );

        installer.install(dir.path()).await.unwrap();

        assert!(dir.path().join("installed.marker").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_failure_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let installer = CommandInstaller::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);

        let err = installer.install(dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallError::Failed { code: 3, .. }));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    /// Run a stderr-writing install with a subscriber at `level`, returning what it logged
    async fn install_logged_at(level: Level) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        let installer = CommandInstaller::new(
            "sh",
            vec!["-c".to_string(), "echo 'npm WARN deprecated' >&2".to_string()],
        );
        installer.install(dir.path()).await.unwrap();

        log.contents()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_installer_stderr_stays_below_warn() {
        assert!(!install_logged_at(Level::WARN)
            .await
            .contains("npm WARN deprecated"));
        assert!(install_logged_at(Level::INFO)
            .await
            .contains("npm WARN deprecated"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let installer = CommandInstaller::new("launchpad-no-such-installer", vec![]);

        let err = installer.install(dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_timeout() {
        let dir = TempDir::new().unwrap();
        let installer = CommandInstaller::new("sh", vec!["-c".to_string(), "sleep 5".to_string()])
            .with_timeout(Duration::from_millis(100));

        let err = installer.install(dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallError::TimedOut { .. }));
    }
}
