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

//! profile renders the interface profile consumed by the OS network stack.
//!
//! Profiles are only ever created, never updated: an existing profile is
//! left alone without being read. New profiles are rendered next to their
//! destination and moved into place once complete, so a failed render never
//! leaves a truncated profile behind.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use slog::{info, Logger};

use crate::errors::ErrorKind;
use crate::metadata::ResolvedInterface;

/// Default template location.
pub const PROFILE_TEMPLATE_PATH: &str = "/etc/oci-vnic/profile.tpl";
/// Default directory for interface profiles.
pub const PROFILE_DIR: &str = "/etc/sysconfig/network-scripts";

const PROFILE_MODE: u32 = 0o644;
const TEMPLATE_NAME: &str = "profile";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// Values available to the profile template.
#[derive(Debug, Serialize)]
struct ProfileContext<'a> {
    interface_name: &'a str,
    index: usize,
    mac_addr: &'a str,
    private_ip: &'a str,
    subnet_mask_length: &'a str,
    virtual_router_ip: &'a str,
    ipv6_addresses: &'a [String],
    ipv6_subnet_mask_length: &'a str,
    ipv6_virtual_router_ip: &'a str,
    uuid: String,
}

impl<'a> From<&'a ResolvedInterface> for ProfileContext<'a> {
    fn from(iface: &'a ResolvedInterface) -> Self {
        let record = &iface.record;
        let ipv6 = record.ipv6.as_ref();
        ProfileContext {
            interface_name: &iface.interface_name,
            index: record.index,
            mac_addr: &record.mac_addr,
            private_ip: &record.private_ip,
            subnet_mask_length: &record.subnet_mask_length,
            virtual_router_ip: &record.virtual_router_ip,
            ipv6_addresses: ipv6.map_or(&[][..], |v| v.addresses.as_slice()),
            ipv6_subnet_mask_length: ipv6.map_or("", |v| v.subnet_mask_length.as_str()),
            ipv6_virtual_router_ip: ipv6.map_or("", |v| v.virtual_router_ip.as_str()),
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProfileWriter {
    profile_dir: PathBuf,
    template_path: PathBuf,
    log: Logger,
}

impl ProfileWriter {
    pub fn new(
        profile_dir: impl Into<PathBuf>,
        template_path: impl Into<PathBuf>,
        log: Logger,
    ) -> Self {
        ProfileWriter {
            profile_dir: profile_dir.into(),
            template_path: template_path.into(),
            log,
        }
    }

    /// Return the deterministic profile path for an interface.
    pub fn profile_path(&self, interface_name: &str) -> PathBuf {
        self.profile_dir.join(format!("ifcfg-{interface_name}"))
    }

    /// Render and persist the profile for `iface`, unless one already exists.
    pub fn emit(&self, iface: &ResolvedInterface) -> Result<EmitOutcome> {
        let path = self.profile_path(&iface.interface_name);
        if path.exists() {
            info!(self.log, "profile already exists"; "path" => %path.display());
            return Ok(EmitOutcome::AlreadyExists(path));
        }

        info!(self.log, "generating profile"; "path" => %path.display());
        self.write_profile(iface, &path)
            .context(ErrorKind::Emit(path.clone()))
    }

    fn write_profile(&self, iface: &ResolvedInterface, path: &Path) -> Result<EmitOutcome> {
        let registry = self.load_template()?;
        let ctx = ProfileContext::from(iface);

        let dir = path.parent().unwrap_or(&self.profile_dir);
        let mut tmp = tempfile::Builder::new()
            .prefix(".ifcfg-")
            .tempfile_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;

        registry
            .render_to_write(TEMPLATE_NAME, &ctx, &mut tmp)
            .map_err(|e| anyhow!("failed to render template: {}", e))?;
        tmp.flush().context("failed to flush profile")?;
        tmp.as_file()
            .set_permissions(Permissions::from_mode(PROFILE_MODE))
            .context("failed to set profile permissions")?;

        match tmp.persist_noclobber(path) {
            Ok(_) => {
                info!(self.log, "profile written"; "path" => %path.display());
                Ok(EmitOutcome::Created(path.to_path_buf()))
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                info!(self.log, "profile appeared concurrently, keeping it"; "path" => %path.display());
                Ok(EmitOutcome::AlreadyExists(path.to_path_buf()))
            }
            Err(e) => Err(anyhow!(e.error).context(format!("failed to persist {}", path.display()))),
        }
    }

    fn load_template(&self) -> Result<Handlebars<'static>> {
        let source = fs::read_to_string(&self.template_path).with_context(|| {
            format!("failed to read template {}", self.template_path.display())
        })?;

        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| {
                anyhow!(
                    "failed to parse template {}: {}",
                    self.template_path.display(),
                    e
                )
            })?;
        Ok(registry)
    }
}
