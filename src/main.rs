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

mod cli;
mod errors;
mod metadata;
mod network;
mod profile;
mod providers;
mod retry;

use anyhow::{Context, Result};
use slog::{crit, debug, o, Drain, Logger};

fn main() {
    // setup logging
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    let log = Logger::root(drain.fuse(), o!());

    debug!(log, "logging initialized");

    let code = match run(&log) {
        Ok(()) => 0,
        Err(e) => {
            crit!(log, "{:?}", e);
            1
        }
    };

    // flush pending records before exiting
    drop(log);
    drop(guard);
    std::process::exit(code);
}

fn run(log: &Logger) -> Result<()> {
    let config = cli::parse_args(log, std::env::args())
        .context("failed to parse command-line arguments")?;

    config.run(log)?;

    debug!(log, "done");
    Ok(())
}
