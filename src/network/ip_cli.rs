//! Helpers for shelling out to the `ip` command.

use super::{normalize_mac, HardwareAddressResolver};
use crate::errors::ErrorKind;
use anyhow::{bail, Context, Result};
use slog::{info, Logger};
use std::process::Command;

/// Default location of the `ip` binary.
const IP_COMMAND: &str = "/sbin/ip";

/// Marker preceding the hardware address in `ip link show` output.
const LINK_ETHER: &str = "link/ether";

/// Resolve hardware addresses through `ip link show dev <name>`.
#[derive(Clone, Debug)]
pub struct IpLinkResolver {
    command: String,
    log: Logger,
}

impl IpLinkResolver {
    pub fn new(log: Logger) -> Self {
        IpLinkResolver {
            command: IP_COMMAND.to_string(),
            log,
        }
    }

    fn ip_link_show(&self, dev_name: &str) -> Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.args(["link", "show"]).args(["dev", dev_name]);
        try_exec(&self.log, cmd).context("'ip link show' failed")
    }
}

impl HardwareAddressResolver for IpLinkResolver {
    fn resolve_hardware_address(&self, interface_name: &str) -> Result<String> {
        self.ip_link_show(interface_name)
            .and_then(|output| parse_link_address(&output))
            .context(ErrorKind::Resolution(interface_name.to_string()))
    }
}

/// Extract the hardware address from `ip link show` output.
///
/// Only the last non-empty line is considered, and it must read
/// `link/ether <addr> brd <broadcast>`.
pub(crate) fn parse_link_address(output: &str) -> Result<String> {
    let line = match output.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line,
        None => bail!("ip command returned empty result"),
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 || parts[0] != LINK_ETHER {
        bail!("failed to parse mac address from '{}'", line);
    }

    Ok(normalize_mac(parts[1]))
}

/// Try to execute and capture stdout, and report stderr on failure.
fn try_exec(log: &Logger, cmd: Command) -> Result<String> {
    let mut cmd = cmd;
    info!(log, "running command"; "cmd" => ?cmd);

    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{}", stderr.trim());
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    info!(log, "command returned"; "stdout" => &stdout);
    Ok(stdout)
}
