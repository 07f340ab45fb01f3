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
use netlab::{
    experiment::l2::{self, FlowSetup},
    ExperimentError,
};
use netns_lab::{cli::run_cli, Active, Lab};
use tokio::io::BufReader;

/// Experiment 2: two OVS switches in standalone mode. Record the connectivity before and after
/// adding OpenFlow rules on s1.
#[derive(Debug, Parser)]
struct Cli {
    /// File to which the results are written. An existing file is overwritten.
    #[clap(long = "output", short = 'o', default_value = l2::RESULT_FILE)]
    output: PathBuf,
    /// Install the flows on s1 directly instead of waiting for the operator.
    #[clap(long = "apply-flows", short = 'a')]
    apply_flows: bool,
    /// Remove the network right after the experiment, without starting the interactive shell.
    #[clap(long = "no-cli")]
    no_cli: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    netlab::init_logging();

    let args = Cli::parse();
    let topo = l2::topology()?;

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

/// Run the experiment and start the shell. The prompt and the shell share stdin.
async fn run(lab: &Lab<Active>, args: &Cli) -> Result<(), ExperimentError> {
    let mut stdin = BufReader::new(tokio::io::stdin());

    let setup = if args.apply_flows {
        FlowSetup::Automatic
    } else {
        FlowSetup::Operator { input: &mut stdin }
    };
    let rec = l2::run(lab, lab.topology(), &args.output, setup, tokio::io::stdout()).await?;
    println!("\nResults written to {}", rec.path().display());

    if !args.no_cli {
        run_cli(lab, lab.topology(), &mut stdin, tokio::io::stdout()).await?;
    }
    Ok(())
}
