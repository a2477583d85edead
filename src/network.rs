// Copyright 2017 CoreOS, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! network looks up the hardware address of a local interface.
//!
//! The interface is expected to already exist (we are normally started by
//! its appearance), so lookups are never retried: a failure here means the
//! environment is broken, not that something is late.

use anyhow::Result;

mod datalink;
mod ip_cli;

pub use self::datalink::DatalinkResolver;
pub use self::ip_cli::IpLinkResolver;
#[cfg(test)]
pub(crate) use self::ip_cli::parse_link_address;

/// Capability to resolve the hardware address of a named interface.
pub trait HardwareAddressResolver {
    /// Return the lowercased hardware address of `interface_name`.
    fn resolve_hardware_address(&self, interface_name: &str) -> Result<String>;
}

/// Normalize a hardware address for comparison.
pub fn normalize_mac(mac: &str) -> String {
    mac.to_ascii_lowercase()
}
