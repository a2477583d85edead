//! Native interface lookup, without shelling out.

use super::{normalize_mac, HardwareAddressResolver};
use crate::errors::ErrorKind;
use anyhow::{anyhow, Context, Result};
use pnet_datalink::MacAddr;
use slog::{info, Logger};

/// Resolve hardware addresses from the kernel interface list.
#[derive(Clone, Debug)]
pub struct DatalinkResolver {
    log: Logger,
}

impl DatalinkResolver {
    pub fn new(log: Logger) -> Self {
        DatalinkResolver { log }
    }
}

impl HardwareAddressResolver for DatalinkResolver {
    fn resolve_hardware_address(&self, interface_name: &str) -> Result<String> {
        let interfaces = pnet_datalink::interfaces();
        info!(self.log, "looking up interface"; "name" => interface_name, "candidates" => interfaces.len());
        let candidates = interfaces.iter().map(|i| (i.name.as_str(), i.mac));
        find_mac(candidates, interface_name)
            .context(ErrorKind::Resolution(interface_name.to_string()))
    }
}

fn find_mac<'a, I>(interfaces: I, name: &str) -> Result<String>
where
    I: IntoIterator<Item = (&'a str, Option<MacAddr>)>,
{
    let (_, mac) = interfaces
        .into_iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| anyhow!("interface '{}' not found", name))?;

    match mac {
        Some(mac) if mac != MacAddr::zero() => Ok(normalize_mac(&mac.to_string())),
        _ => Err(anyhow!("interface '{}' has no hardware address", name)),
    }
}
