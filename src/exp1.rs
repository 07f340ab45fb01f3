// NetLab: Scripted network experiments on Linux namespaces
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::path::PathBuf;

use clap::Parser;
use netlab::{experiment::routing, ExperimentError};
use netns_lab::{cli::run_cli, Active, Lab};
use tokio::io::BufReader;

/// Experiment 1: build two routers with static routes between four subnets, ping across them, and
/// record the routing and ARP tables.
#[derive(Debug, Parser)]
struct Cli {
    /// File to which the results are written. An existing file is overwritten.
    #[clap(long = "output", short = 'o', default_value = routing::RESULT_FILE)]
    output: PathBuf,
    /// Remove the network right after the experiment, without starting the interactive shell.
    #[clap(long = "no-cli")]
    no_cli: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    netlab::init_logging();

    let args = Cli::parse();
    let topo = routing::topology()?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let lab = Lab::new(topo)?.connect().await?;
            let result = run(&lab, &args).await;
            // the network is removed in any case, but the error of the experiment comes first.
            let teardown = lab.disconnect().await;
            result?;
            teardown?;
            Ok::<(), ExperimentError>(())
        })?;

    Ok(())
}

/// Run the experiment, print the results, and start the shell.
async fn run(lab: &Lab<Active>, args: &Cli) -> Result<(), ExperimentError> {
    let rec = routing::run(lab, lab.topology(), &args.output).await?;
    println!("\n{}", rec.contents()?);

    if !args.no_cli {
        let stdin = BufReader::new(tokio::io::stdin());
        run_cli(lab, lab.topology(), stdin, tokio::io::stdout()).await?;
    }
    Ok(())
}
