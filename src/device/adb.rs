//! `adb`-backed device collaborator.
//!
//! Assumes the device is already connected and booted; this only shells out
//! to `adb` for the two operations the core needs.
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::DeviceConfig;
use crate::executor::input::{DispatchError, ExecResult, InputDispatcher};
use crate::perception::traits::HierarchySource;

#[derive(Debug, Error)]
pub enum AdbError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`adb {command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("`adb {command}` exited with {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`adb {command}` returned no hierarchy: {stdout}")]
    EmptyDump { command: String, stdout: String },
}

#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
    dump_path: String,
    timeout: Duration,
}

impl AdbDevice {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            serial: config.serial.clone(),
            dump_path: config.dump_path.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Full argument list for `adb`, including the `-s` selector.
    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut out = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            out.push("-s");
            out.push(serial.as_str());
        }
        out.extend_from_slice(args);
        out
    }

    /// Runs `adb <args>` to completion. Non-zero exits are returned, not
    /// raised.
    pub async fn run(&self, args: &[&str]) -> Result<ExecResult, AdbError> {
        let full = self.args(args);
        let command = full.join(" ");
        tracing::debug!(adb = %self.adb_path, %command, "running adb");

        let mut cmd = Command::new(&self.adb_path);
        cmd.args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| AdbError::Timeout {
                command: command.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| AdbError::Spawn {
                program: self.adb_path.clone(),
                source,
            })?;

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_checked(&self, args: &[&str]) -> Result<ExecResult, AdbError> {
        let result = self.run(args).await?;
        if !result.success() {
            return Err(AdbError::Failed {
                command: self.args(args).join(" "),
                code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl HierarchySource for AdbDevice {
    async fn dump_hierarchy(&self) -> Result<String, DispatchError> {
        self.run_checked(&["shell", "uiautomator", "dump", &self.dump_path])
            .await?;
        let cat = self.run_checked(&["exec-out", "cat", &self.dump_path]).await?;
        let xml = extract_document(&cat.stdout).ok_or_else(|| AdbError::EmptyDump {
            command: format!("exec-out cat {}", self.dump_path),
            stdout: cat.stdout.chars().take(200).collect(),
        })?;
        Ok(xml.to_string())
    }
}

#[async_trait]
impl InputDispatcher for AdbDevice {
    async fn dispatch_tap(&self, x: f64, y: f64) -> Result<ExecResult, DispatchError> {
        let x = format!("{}", x.round() as i64);
        let y = format!("{}", y.round() as i64);
        Ok(self.run(&["shell", "input", "tap", &x, &y]).await?)
    }
}

/// Trims anything `uiautomator` printed around the document.
fn extract_document(stdout: &str) -> Option<&str> {
    let start = stdout.find('<')?;
    let end = stdout.rfind('>')?;
    (end > start).then(|| &stdout[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_include_serial() {
        let device = AdbDevice::new(&DeviceConfig {
            serial: Some("emulator-5554".into()),
            ..DeviceConfig::default()
        });
        assert_eq!(
            device.args(&["shell", "input", "tap", "5", "5"]),
            vec!["-s", "emulator-5554", "shell", "input", "tap", "5", "5"]
        );
        assert_eq!(device.serial(), Some("emulator-5554"));
        let any = AdbDevice::new(&DeviceConfig::default());
        assert_eq!(any.serial(), None);
        assert_eq!(any.args(&["devices"]), vec!["devices"]);
    }

    #[test]
    fn test_extract_document() {
        let out = "<?xml version='1.0' ?><hierarchy rotation=\"0\"/>UI hierchary dumped to: /dev/tty\n";
        assert_eq!(
            extract_document(out),
            Some("<?xml version='1.0' ?><hierarchy rotation=\"0\"/>")
        );
        assert_eq!(extract_document("error: no devices/emulators found"), None);
    }

    #[tokio::test]
    async fn test_missing_adb_binary_is_spawn_error() {
        let device = AdbDevice::new(&DeviceConfig {
            adb_path: "/nonexistent/droidlens-adb".into(),
            ..DeviceConfig::default()
        });
        let err = device.dispatch_tap(1.0, 1.0).await.unwrap_err();
        assert!(err.downcast_ref::<AdbError>().is_some_and(|e| matches!(e, AdbError::Spawn { .. })));
    }
}
