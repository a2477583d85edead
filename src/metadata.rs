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

//! Correlate a local interface with the metadata of its VNIC.
//!
//! Both the metadata service and the VNIC attachment are eventually
//! consistent, so matching runs two nested retry loops: the inner one waits
//! for the metadata service to answer at all, the outer one waits for the
//! VNIC to show up in its answer.

use std::time::Duration;

use anyhow::Result;
use slog::{info, Logger};

use crate::errors::ErrorKind;
use crate::network::normalize_mac;
use crate::providers::{InterfaceRecord, MetadataProvider};
use crate::retry::{Clock, Retry, SystemClock};

/// How long to wait for the metadata service to answer.
pub const METADATA_SERVICE_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// How long to wait for the VNIC to be listed by the metadata service.
pub const VNIC_ATTACHMENT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// A local interface and the metadata of the VNIC backing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInterface {
    pub interface_name: String,
    pub record: InterfaceRecord,
}

/// Return the first record carrying `mac` (compared case-insensitively).
pub fn find_by_hardware_address<'a>(
    records: &'a [InterfaceRecord],
    mac: &str,
) -> Option<&'a InterfaceRecord> {
    let mac = normalize_mac(mac);
    records.iter().find(|r| normalize_mac(&r.mac_addr) == mac)
}

pub struct Matcher<'a, P, C = SystemClock>
where
    P: MetadataProvider + ?Sized,
    C: Clock,
{
    provider: &'a P,
    clock: C,
    metadata_ready: Retry,
    attachment_ready: Retry,
    log: Logger,
}

impl<'a, P> Matcher<'a, P>
where
    P: MetadataProvider + ?Sized,
{
    pub fn new(provider: &'a P, log: Logger) -> Self {
        Matcher::with_clock(provider, SystemClock, log)
    }
}

impl<'a, P, C> Matcher<'a, P, C>
where
    P: MetadataProvider + ?Sized,
    C: Clock,
{
    pub fn with_clock(provider: &'a P, clock: C, log: Logger) -> Self {
        Matcher {
            provider,
            clock,
            metadata_ready: Retry::new().max_elapsed_time(METADATA_SERVICE_READY_TIMEOUT),
            attachment_ready: Retry::new().max_elapsed_time(VNIC_ATTACHMENT_READY_TIMEOUT),
            log,
        }
    }

    /// Override how long to wait for the metadata service.
    pub fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_ready = self.metadata_ready.max_elapsed_time(timeout);
        self
    }

    /// Override how long to wait for the VNIC attachment.
    pub fn attachment_timeout(mut self, timeout: Duration) -> Self {
        self.attachment_ready = self.attachment_ready.max_elapsed_time(timeout);
        self
    }

    /// Fetch all attached VNICs, waiting for the metadata service to answer.
    pub fn fetch_interfaces(&self) -> Result<Vec<InterfaceRecord>> {
        let log = self.log.new(slog::o!("wait" => "metadata-service"));
        self.metadata_ready
            .retry_with_clock(&self.clock, &log, |_| self.provider.fetch_all_interfaces())
    }

    /// Find the VNIC whose hardware address is `mac`, waiting for it to be
    /// attached, and bind it to `interface_name`.
    pub fn resolve(&self, interface_name: &str, mac: &str) -> Result<ResolvedInterface> {
        let log = self.log.new(slog::o!("wait" => "vnic-attachment"));
        self.attachment_ready
            .retry_with_clock(&self.clock, &log, |_| self.match_once(interface_name, mac))
    }

    fn match_once(&self, interface_name: &str, mac: &str) -> Result<ResolvedInterface> {
        info!(self.log, "matching vnic metadata"; "mac" => mac);
        let records = self.fetch_interfaces()?;

        match find_by_hardware_address(&records, mac) {
            Some(record) => {
                let resolved = ResolvedInterface {
                    interface_name: interface_name.to_string(),
                    record: record.clone(),
                };
                info!(self.log, "vnic metadata matched";
                      "interface" => interface_name,
                      "index" => record.index,
                      "metadata" => ?resolved.record);
                Ok(resolved)
            }
            None => {
                info!(self.log, "vnic metadata not matched";
                      "mac" => mac,
                      "vnics" => records.len());
                Err(ErrorKind::Match(normalize_mac(mac)).into())
            }
        }
    }
}
