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

//! Experiment 2: L2 switching with two OVS bridges, and OpenFlow rules installed on `s1`.
//!
//! ```text
//! h1 -- s1 -- s2 -- h3
//!       |
//!       h2
//! ```
//!
//! Both switches run in standalone mode, so they behave like learning switches until flows are
//! installed. After the baseline, the operator installs two flows on `s1` (or they are installed
//! automatically): drop everything arriving from `h2` (port 2), and forward everything arriving
//! from `h1` (port 1) to `s2` (port 3).

use std::path::Path;

use itertools::Itertools;
use netns_lab::{
    config::CONFIG,
    topology::{FailMode, LinkSpec, Node, Topology},
    FlowRule, LabError, NodeExec,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::{probes, ExperimentError};
use crate::recorder::ResultRecorder;

/// Default name of the result file.
pub const RESULT_FILE: &str = "result2.txt";

/// Title of the result file.
pub const TITLE: &str = "Experiment 2: SDN (L2) Results";

/// The switch on which the flows are installed.
pub const SWITCH: &str = "s1";

/// Connectivity checks, in the order they are recorded (before and after adding the flows).
pub const PING_TESTS: [(&str, &str); 2] = [("h1", "h3"), ("h2", "h3")];

/// Message printed while waiting for the operator.
pub const PROMPT: &str = "Press ENTER here after you have added the flows on s1...";

/// How the flows on `s1` are installed.
#[derive(Debug)]
pub enum FlowSetup<R> {
    /// Print the instructions and wait for the operator to press enter on `input`.
    Operator {
        /// Where the operator confirms
        input: R,
    },
    /// Install the flows with `ovs-ofctl add-flow`.
    Automatic,
}

/// Build the topology of the experiment. Hosts get the MAC addresses `00:00:00:00:00:0N`.
pub fn topology() -> Result<Topology, ExperimentError> {
    let mut topo = Topology::new();
    topo.auto_set_macs();
    topo.add_node(Node::switch("s1").with_fail_mode(FailMode::Standalone));
    topo.add_node(Node::switch("s2").with_fail_mode(FailMode::Standalone));
    topo.add_node(Node::host("h1").with_ip("10.0.0.1/24".parse()?));
    topo.add_node(Node::host("h2").with_ip("10.0.0.2/24".parse()?));
    topo.add_node(Node::host("h3").with_ip("10.0.0.3/24".parse()?));
    // s1-eth1, s1-eth2, s1-eth3 <-> s2-eth1, s2-eth2
    topo.add_link(LinkSpec::new("h1", "s1"))?;
    topo.add_link(LinkSpec::new("h2", "s1"))?;
    topo.add_link(LinkSpec::new("s1", "s2"))?;
    topo.add_link(LinkSpec::new("s2", "h3"))?;
    Ok(topo)
}

/// The flows installed on `s1`.
pub fn flow_rules() -> [FlowRule; 2] {
    [FlowRule::drop(2), FlowRule::forward(1, 3)]
}

/// The command line that installs `rule` on `s1`, as shown to the operator.
pub fn add_flow_command(rule: &FlowRule) -> String {
    format!("sudo ovs-ofctl add-flow {SWITCH} \"{rule}\"")
}

/// Ping between all pairs of [`PING_TESTS`] and record the output below `title`.
pub async fn record_pings<E>(
    exec: &E,
    topo: &Topology,
    rec: &mut ResultRecorder,
    title: &str,
) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    rec.section(title)?;
    for probe in probes(topo, &PING_TESTS)? {
        let result = probe.run(exec).await?;
        rec.entry(
            &format!("{} -> {} (ping -c 1):", probe.src, probe.dst),
            &result.output,
        )?;
    }
    Ok(())
}

/// Record the ports and the flow table of `s1`.
pub async fn show_ports_and_flows<E>(
    exec: &E,
    rec: &mut ResultRecorder,
    when: &str,
) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    rec.write("\n")?;
    rec.section(&format!("Switch {SWITCH} state {when}:"))?;
    let show = exec.ofctl_show(SWITCH).await?;
    rec.entry(&format!("sudo ovs-ofctl show {SWITCH}"), &show)?;
    let flows = exec.dump_flows(SWITCH).await?;
    rec.entry(&format!("sudo ovs-ofctl dump-flows {SWITCH}"), &flows)?;
    Ok(())
}

/// Print the instructions for the operator, and wait until they press enter. Reaching the end of
/// the input also continues.
pub async fn prompt_to_add_flows<R, W>(mut input: R, mut output: W) -> Result<(), ExperimentError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    log::info!("=== ACTION REQUIRED (in another terminal) ===");
    log::info!("1) Inspect port numbers:");
    log::info!("   sudo {} show {SWITCH}", CONFIG.tools.ovs_ofctl);
    log::info!("2) Add flows on {SWITCH}:");
    for rule in flow_rules() {
        log::info!("   {}", add_flow_command(&rule));
    }
    output.write_all(PROMPT.as_bytes()).await?;
    output.flush().await?;

    let mut line = String::new();
    input.read_line(&mut line).await?;
    Ok(())
}

/// Install the flows on `s1` with `ovs-ofctl add-flow`.
pub async fn apply_flows<E>(exec: &E) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    for rule in flow_rules() {
        let out = exec.add_flow(SWITCH, &rule).await?;
        if out.trim().is_empty() {
            log::info!("[{SWITCH}] added flow {rule}");
        } else {
            log::warn!("[{SWITCH}] add-flow {rule}: {}", out.trim());
        }
    }
    Ok(())
}

/// Check that the flows are installed on `s1`. Missing flows are only logged. Returns `true` if
/// all flows were found.
pub async fn verify_flows<E>(exec: &E) -> Result<bool, ExperimentError>
where
    E: NodeExec + ?Sized,
{
    let ports = match exec.ports(SWITCH).await {
        Ok(ports) => ports,
        Err(LabError::Parse(e)) => {
            log::warn!("[{SWITCH}] Cannot parse the ports: {e}");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    let flows = match exec.flows(SWITCH).await {
        Ok(flows) => flows,
        Err(LabError::Parse(e)) => {
            log::warn!("[{SWITCH}] Cannot parse the flows: {e}");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    let missing = flow_rules()
        .into_iter()
        .filter(|rule| !flows.iter().any(|f| f.is_rule(rule, &ports)))
        .collect_vec();
    if missing.is_empty() {
        log::info!("[{SWITCH}] all flows are installed");
    } else {
        log::warn!(
            "[{SWITCH}] missing flows: {}",
            missing.iter().map(|r| r.to_string()).join(", ")
        );
    }
    Ok(missing.is_empty())
}

/// Write the commands that install the flows.
pub fn record_commands_section(rec: &mut ResultRecorder) -> Result<(), ExperimentError> {
    rec.write(&format!("Commands used on {SWITCH}:\n"))?;
    for rule in flow_rules() {
        rec.write(&format!("{}\n", add_flow_command(&rule)))?;
    }
    Ok(())
}

/// Run the whole experiment on a running network, and write the results to `output`. The prompt
/// for the operator is written to `prompt`.
pub async fn run<E, R, W>(
    exec: &E,
    topo: &Topology,
    output: impl AsRef<Path>,
    setup: FlowSetup<R>,
    prompt: W,
) -> Result<ResultRecorder, ExperimentError>
where
    E: NodeExec + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rec = ResultRecorder::create(output)?;
    rec.header(TITLE)?;

    record_pings(exec, topo, &mut rec, "Baseline connectivity (before adding flows):").await?;
    show_ports_and_flows(exec, &mut rec, "BEFORE adding flows").await?;

    match setup {
        FlowSetup::Operator { input } => prompt_to_add_flows(input, prompt).await?,
        FlowSetup::Automatic => apply_flows(exec).await?,
    }
    if !verify_flows(exec).await? {
        log::warn!("The flows on {SWITCH} do not match the expected rules!");
    }

    show_ports_and_flows(exec, &mut rec, "AFTER adding flows").await?;
    record_commands_section(&mut rec)?;

    rec.write("\n")?;
    record_pings(exec, topo, &mut rec, &format!("Connectivity AFTER adding flows to {SWITCH}:"))
        .await?;

    log::info!("*** All results saved to {}", rec.path().display());
    Ok(rec)
}
