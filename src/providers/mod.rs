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

//! Providers
//!
//! These are the metadata services oci-vnic knows how to list attached
//! virtual interfaces from. Internally, they handle the ins and outs of each
//! provider's wire format, and externally, they return a list of
//! `InterfaceRecord`s in a regular format.

use anyhow::Result;

pub mod oraclecloud;

/// One virtual interface attached to the instance, as reported by a single
/// metadata response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceRecord {
    /// Position in the metadata response. Only meaningful within that
    /// response.
    pub index: usize,
    /// Lowercased hardware address; unique within one response.
    pub mac_addr: String,
    pub private_ip: String,
    pub subnet_mask_length: String,
    pub virtual_router_ip: String,
    /// Only set when the interface has at least one IPv6 address.
    pub ipv6: Option<Ipv6Config>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipv6Config {
    pub addresses: Vec<String>,
    pub subnet_mask_length: String,
    pub virtual_router_ip: String,
}

/// A source of attached virtual interfaces.
///
/// Implementations perform a single attempt per call; retrying belongs to
/// the caller.
pub trait MetadataProvider {
    fn fetch_all_interfaces(&self) -> Result<Vec<InterfaceRecord>>;
}

/// Return the prefix length of a CIDR block.
///
/// This is lenient on purpose: whatever follows the last `/` is returned,
/// and a block without `/` is returned unchanged.
pub fn mask_length(cidr: &str) -> String {
    match cidr.rsplit_once('/') {
        Some((_, len)) => len.to_string(),
        None => cidr.to_string(),
    }
}
