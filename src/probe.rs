//! Reachability probe
//!
//! Liveness is checked with the system echo tool. Unreachability is an
//! expected outcome, so every failure (including a failure to run the tool)
//! is reported as `false`.

use crate::error::ConfigError;
use std::net::Ipv4Addr;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};

/// Liveness check for one address
pub trait Prober: Send + Sync {
    /// True if the address answered an echo request
    fn is_alive(&self, address: Ipv4Addr) -> bool;
}

/// Echo tools we know how to drive, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoTool {
    /// `fping -q -r2 -t<ms>`
    Fping,
    /// `ping -q -c3 -W<secs>` (iputils)
    Ping,
}

impl EchoTool {
    const ALL: [EchoTool; 2] = [EchoTool::Fping, EchoTool::Ping];

    fn program(self) -> &'static str {
        match self {
            EchoTool::Fping => "fping",
            EchoTool::Ping => "ping",
        }
    }

    /// Build the command line for one probe
    pub fn command(self, address: Ipv4Addr, timeout: Duration) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            EchoTool::Fping => {
                cmd.arg("-q")
                    .arg("-r2")
                    .arg(format!("-t{}", timeout.as_millis().max(1)));
            }
            EchoTool::Ping => {
                cmd.arg("-q")
                    .arg("-c3")
                    .arg(format!("-W{}", timeout.as_secs().max(1)));
            }
        }
        cmd.arg(address.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

/// Probe backed by `fping` or `ping`
#[derive(Debug, Clone)]
pub struct PingProber {
    tool: EchoTool,
    timeout: Duration,
}

impl PingProber {
    /// Use a specific tool without checking it works
    pub fn with_tool(tool: EchoTool, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    /// Pick the first tool that answers for the loopback address
    pub fn detect(timeout: Duration) -> Result<Self, ConfigError> {
        for tool in EchoTool::ALL {
            let probe = Self::with_tool(tool, timeout);
            if probe.is_alive(Ipv4Addr::LOCALHOST) {
                debug!(tool = tool.program(), "Echo tool selected");
                return Ok(probe);
            }
        }

        Err(ConfigError::ProbeUnavailable {
            tried: EchoTool::ALL
                .iter()
                .map(|t| t.program())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn tool(&self) -> EchoTool {
        self.tool
    }
}

impl Prober for PingProber {
    fn is_alive(&self, address: Ipv4Addr) -> bool {
        match self.tool.command(address, self.timeout).status() {
            Ok(status) => status.success(),
            Err(e) => {
                warn!(
                    router = %address,
                    tool = self.tool.program(),
                    error = %e,
                    "Echo tool failed to run"
                );
                false
            }
        }
    }
}
