// Copyright 2025 The mssh Authors
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

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;

use mssh::cli::RexecCli;
use mssh::config::load_inventory;
use mssh::outcome::{has_failures, tally};
use mssh::ui::OutputFormatter;
use mssh::utils::init_logging;
use mssh::{ConnectionPool, PoolPolicy, SshConnector};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RexecCli::parse();
    init_logging(cli.hosts.verbose);

    let request = cli.request()?;
    let inventory = load_inventory(
        &cli.hosts.source(),
        &cli.hosts.defaults(),
        cli.hosts.connect_timeout(),
    )
    .await?;
    let connector = Arc::new(
        SshConnector::new(inventory.connect_timeout)
            .with_host_key_check(cli.hosts.host_key_check.clone()),
    );

    let started = Instant::now();

    // Nothing runs unless every host is reachable.
    let pool = ConnectionPool::connect(connector, &inventory.hosts, PoolPolicy::Strict)
        .await
        .context("Refusing to run on a partial set of hosts")?;

    let outcomes = pool.exec(&request).await;

    if let Err(e) = pool.close().await {
        tracing::warn!("{}", e);
    }

    for outcome in &outcomes {
        outcome.print_output();
    }

    let (succeeded, failed) = tally(&outcomes);
    print!(
        "{}",
        OutputFormatter::format_summary(outcomes.len(), succeeded, failed)
    );
    println!(
        "Completed in {}",
        OutputFormatter::format_duration(started.elapsed())
    );

    if has_failures(&outcomes) {
        std::process::exit(1);
    }

    Ok(())
}
