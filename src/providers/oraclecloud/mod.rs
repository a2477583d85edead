// Copyright 2020 CoreOS, Inc.
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

//! oraclecloud VNIC metadata fetcher.
//! The metadata endpoint is documented at
//! https://docs.oracle.com/en-us/iaas/Content/Compute/Tasks/gettingmetadata.htm.

use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer};
use slog::{info, Logger};

use crate::errors::ErrorKind;
use crate::network::normalize_mac;
use crate::providers::{mask_length, InterfaceRecord, Ipv6Config, MetadataProvider};
use crate::retry;


const ORACLECLOUD_METADATA_BASE_URL: &str = "http://169.254.169.254/opc/v2";

#[derive(Clone, Debug)]
pub struct OracleCloudProvider {
    client: retry::Client,
    log: Logger,
}

impl OracleCloudProvider {
    pub fn try_new(log: Logger) -> Result<OracleCloudProvider> {
        let client = retry::Client::try_new(log.clone())?;
        Ok(Self::new_with_client(client, log))
    }

    pub(crate) fn new_with_client(client: retry::Client, log: Logger) -> OracleCloudProvider {
        OracleCloudProvider { client, log }
    }

    fn endpoint_for(name: &str) -> String {
        format!("{ORACLECLOUD_METADATA_BASE_URL}/{name}")
    }

    fn fetch_vnics(&self) -> Result<Vec<Vnic>> {
        self.client
            .get(retry::Json, Self::endpoint_for("vnics/"))
            .header(
                HeaderName::from_static("authorization"),
                HeaderValue::from_static("Bearer Oracle"),
            )
            .send()
            .context("fetch vnics metadata")
    }
}

impl MetadataProvider for OracleCloudProvider {
    fn fetch_all_interfaces(&self) -> Result<Vec<InterfaceRecord>> {
        let vnics = self.fetch_vnics().context(ErrorKind::Fetch)?;
        info!(self.log, "oci vnics metadata"; "vnics" => ?vnics);

        Ok(vnics
            .into_iter()
            .enumerate()
            .map(|(index, vnic)| vnic.into_record(index))
            .collect())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Vnic {
    #[serde(default, deserialize_with = "null_as_empty")]
    mac_addr: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    private_ip: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    subnet_cidr_block: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    virtual_router_ip: String,
    #[serde(default)]
    ipv6_addresses: Option<Vec<String>>,
    #[serde(default)]
    ipv6_subnet_cidr_block: Option<String>,
    #[serde(default)]
    ipv6_virtual_router_ip: Option<String>,
}

/// Absent and `null` strings both decode as empty; other types are rejected.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Vnic {
    fn into_record(self, index: usize) -> InterfaceRecord {
        let ipv6 = match self.ipv6_addresses {
            Some(addresses) if !addresses.is_empty() => Some(Ipv6Config {
                addresses,
                subnet_mask_length: mask_length(
                    self.ipv6_subnet_cidr_block.as_deref().unwrap_or_default(),
                ),
                virtual_router_ip: self.ipv6_virtual_router_ip.unwrap_or_default(),
            }),
            _ => None,
        };

        InterfaceRecord {
            index,
            mac_addr: normalize_mac(&self.mac_addr),
            subnet_mask_length: mask_length(&self.subnet_cidr_block),
            private_ip: self.private_ip,
            virtual_router_ip: self.virtual_router_ip,
            ipv6,
        }
    }
}
