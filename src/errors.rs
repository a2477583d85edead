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

//! Failure kinds for each pipeline stage.
//!
//! Stages return `anyhow::Result` and attach one of these kinds as context,
//! so callers (and tests) can recover the stage that failed with
//! `anyhow::Error::downcast_ref::<ErrorKind>()` no matter how much context
//! was layered on top afterwards.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ErrorKind {
    /// The hardware address of the interface could not be obtained.
    #[error("failed to resolve hardware address of interface '{0}'")]
    Resolution(String),
    /// The metadata service could not be reached or returned garbage.
    #[error("failed to fetch vnics metadata")]
    Fetch,
    /// No attached VNIC carries the resolved hardware address.
    #[error("no vnic metadata matches hardware address {0}")]
    Match(String),
    /// The interface profile could not be rendered or written.
    #[error("failed to emit interface profile {}", .0.display())]
    Emit(PathBuf),
}

/// Return the stage failure kind carried by an error chain, if any.
#[cfg(test)]
pub fn kind_of(err: &anyhow::Error) -> Option<&ErrorKind> {
    err.downcast_ref::<ErrorKind>()
}
