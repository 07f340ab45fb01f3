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

//! Module for configuring and querying hosts and routers (and switches) of a running lab.
//!
//! All node commands go through [`NodeExec::cmd`]: a shell line that is executed inside the
//! namespace of the node, or in the root namespace for switches. The output (STDOUT followed by
//! STDERR) is returned verbatim, and a non-zero exit code is *not* an error. Commands that create
//! the network itself are part of the setup plan instead, and those are checked.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    config::CONFIG,
    probe::ProbeResult,
    switch::{FlowEntry, FlowRule, PortDesc},
    topology::{MacAddr, NodeKind, Route},
    Active, Lab, LabCommand, LabError,
};

mod table_parser;
mod tables;

pub use table_parser::TableParseError;
pub use tables::{ArpEntry, RouteEntry};

/// Interface to execute commands on the nodes of a running lab.
///
/// Only [`NodeExec::cmd`] must be implemented. All other functions build the command line, call
/// `cmd`, and (where applicable) parse the output.
#[async_trait]
pub trait NodeExec: Send + Sync {
    /// Execute a shell command line on `node` and return everything it printed. The exit code is
    /// not checked.
    async fn cmd(&self, node: &str, cmd: &str) -> Result<String, LabError>;

    /// Set a kernel parameter, e.g., `net.ipv4.ip_forward` to `1`.
    async fn sysctl(&self, node: &str, key: &str, value: &str) -> Result<String, LabError> {
        self.cmd(node, &format!("sysctl -w {key}={value}")).await
    }

    /// Install (or replace) a static route on the node of the route.
    async fn route_replace(&self, route: &Route) -> Result<String, LabError> {
        self.cmd(
            &route.node,
            &format!("{} route replace {route}", CONFIG.tools.ip),
        )
        .await
    }

    /// Pin a permanent neighbor entry.
    async fn neigh_replace(
        &self,
        node: &str,
        ip: Ipv4Addr,
        mac: MacAddr,
        dev: &str,
    ) -> Result<String, LabError> {
        self.cmd(
            node,
            &format!(
                "{} neigh replace {ip} lladdr {mac} dev {dev} nud permanent",
                CONFIG.tools.ip
            ),
        )
        .await
    }

    /// Remove all neighbor entries of an interface.
    async fn neigh_flush(&self, node: &str, dev: &str) -> Result<String, LabError> {
        self.cmd(node, &format!("{} neigh flush dev {dev}", CONFIG.tools.ip))
            .await
    }

    /// Read the MAC address of an interface of the node.
    async fn mac(&self, node: &str, iface: &str) -> Result<MacAddr, LabError> {
        let out = self
            .cmd(node, &format!("cat /sys/class/net/{iface}/address"))
            .await?;
        Ok(out.trim().parse::<MacAddr>()?)
    }

    /// Send `count` echo requests from `node` to `dst` and capture the output.
    async fn ping(&self, node: &str, dst: Ipv4Addr, count: u32) -> Result<ProbeResult, LabError> {
        let output = self.cmd(node, &format!("ping -c {count} {dst}")).await?;
        Ok(ProbeResult {
            src: node.to_string(),
            dst,
            output,
        })
    }

    /// Raw output of `route -n`.
    async fn routing_table(&self, node: &str) -> Result<String, LabError> {
        self.cmd(node, "route -n").await
    }

    /// Parsed output of `route -n`.
    async fn routes(&self, node: &str) -> Result<Vec<RouteEntry>, LabError> {
        Ok(RouteEntry::from_table(&self.routing_table(node).await?)?)
    }

    /// Raw output of `arp -n`.
    async fn arp_table(&self, node: &str) -> Result<String, LabError> {
        self.cmd(node, "arp -n").await
    }

    /// Parsed output of `arp -n`.
    async fn arp_entries(&self, node: &str) -> Result<Vec<ArpEntry>, LabError> {
        Ok(ArpEntry::from_table(&self.arp_table(node).await?)?)
    }

    /// Raw output of `ovs-ofctl show <switch>`.
    async fn ofctl_show(&self, switch: &str) -> Result<String, LabError> {
        self.cmd(switch, &format!("{} show {switch}", CONFIG.tools.ovs_ofctl))
            .await
    }

    /// Parsed ports of `ovs-ofctl show <switch>`.
    async fn ports(&self, switch: &str) -> Result<Vec<PortDesc>, LabError> {
        Ok(PortDesc::from_show(&self.ofctl_show(switch).await?)?)
    }

    /// Raw output of `ovs-ofctl dump-flows <switch>`.
    async fn dump_flows(&self, switch: &str) -> Result<String, LabError> {
        self.cmd(
            switch,
            &format!("{} dump-flows {switch}", CONFIG.tools.ovs_ofctl),
        )
        .await
    }

    /// Parsed output of `ovs-ofctl dump-flows <switch>`.
    async fn flows(&self, switch: &str) -> Result<Vec<FlowEntry>, LabError> {
        Ok(FlowEntry::from_dump(&self.dump_flows(switch).await?)?)
    }

    /// Install a flow rule with `ovs-ofctl add-flow`.
    async fn add_flow(&self, switch: &str, rule: &FlowRule) -> Result<String, LabError> {
        self.cmd(
            switch,
            &format!("{} add-flow {switch} \"{rule}\"", CONFIG.tools.ovs_ofctl),
        )
        .await
    }
}

#[async_trait]
impl NodeExec for Lab<Active> {
    async fn cmd(&self, node: &str, cmd: &str) -> Result<String, LabError> {
        log::debug!("[{node}] {cmd}");
        Ok(self.session(node)?.execute_shell(cmd).await?)
    }
}

/// Build an `ip` command in the given namespace.
fn ip_cmd(ns: Option<String>, args: &[&str]) -> LabCommand {
    LabCommand::maybe_netns(
        ns,
        std::iter::once(CONFIG.tools.ip.as_str()).chain(args.iter().copied()),
    )
}

impl<S> Lab<S> {
    /// Create the namespace of every host and router, and bring up its loopback interface.
    pub(crate) fn plan_namespaces(&self) -> Vec<LabCommand> {
        self.topo
            .nodes()
            .iter()
            .filter_map(|n| n.namespace())
            .flat_map(|ns| {
                [
                    ip_cmd(None, &["netns", "add", &ns]),
                    ip_cmd(Some(ns.clone()), &["link", "set", "lo", "up"]),
                ]
            })
            .collect()
    }

    /// Create all veth pairs. Each end is moved into the namespace of its node, gets its MAC
    /// address and IP address, and is brought up. Ends on a switch are attached to the bridge.
    pub(crate) fn plan_links(&self) -> Vec<LabCommand> {
        let mut plan = Vec::new();
        for link in self.topo.links() {
            plan.push(ip_cmd(
                None,
                &[
                    "link",
                    "add",
                    &link.0.iface,
                    "type",
                    "veth",
                    "peer",
                    "name",
                    &link.1.iface,
                ],
            ));
            for ep in [&link.0, &link.1] {
                // the topology was validated, so both nodes and interfaces exist.
                let Some(node) = self.topo.node(&ep.node) else { continue };
                let Some(iface) = node.iface(&ep.iface) else { continue };
                let ns = node.namespace();
                if let Some(ns) = &ns {
                    plan.push(ip_cmd(None, &["link", "set", &iface.name, "netns", ns]));
                }
                if let Some(mac) = iface.mac {
                    plan.push(ip_cmd(
                        ns.clone(),
                        &["link", "set", "dev", &iface.name, "address", &mac.to_string()],
                    ));
                }
                if let Some(addr) = iface.addr {
                    plan.push(ip_cmd(
                        ns.clone(),
                        &["addr", "add", &addr.to_string(), "dev", &iface.name],
                    ));
                }
                plan.push(ip_cmd(ns, &["link", "set", &iface.name, "up"]));
                if node.kind == NodeKind::Switch {
                    plan.push(Self::plan_switch_port(node, iface));
                }
            }
        }
        plan
    }

    /// Install the default routes and enable IP forwarding on routers.
    pub(crate) fn plan_node_config(&self) -> Vec<LabCommand> {
        let mut plan = Vec::new();
        for node in self.topo.nodes() {
            if let Some(gw) = node.default_gateway {
                plan.push(ip_cmd(
                    node.namespace(),
                    &["route", "add", "default", "via", &gw.to_string()],
                ));
            }
        }
        for router in self.topo.routers() {
            plan.push(LabCommand::maybe_netns(
                router.namespace(),
                ["sysctl", "-w", "net.ipv4.ip_forward=1"],
            ));
        }
        plan
    }

    /// Disable IP forwarding on routers.
    pub(crate) fn plan_node_teardown(&self) -> Vec<LabCommand> {
        self.topo
            .routers()
            .map(|r| {
                LabCommand::maybe_netns(r.namespace(), ["sysctl", "-w", "net.ipv4.ip_forward=0"])
            })
            .collect()
    }

    /// Delete all namespaces. This also removes all interfaces inside them.
    pub(crate) fn plan_namespace_teardown(&self) -> Vec<LabCommand> {
        self.topo
            .nodes()
            .iter()
            .filter_map(|n| n.namespace())
            .map(|ns| ip_cmd(None, &["netns", "del", &ns]))
            .collect()
    }
}

/// Error while parsing the output of a node command.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Cannot parse a table
    #[error("Table parse error: {0}")]
    TableParse(#[from] TableParseError),
    /// Cannot parse IP network
    #[error("Cannot parse IP network: {0}")]
    IpNetParse(#[from] ipnet::AddrParseError),
    /// Cannot parse IP address
    #[error("Cannot parse IP address: {0}")]
    IpAddrParse(#[from] std::net::AddrParseError),
    /// Cannot parse int
    #[error("Cannot parse integer: {0}")]
    IntParse(#[from] std::num::ParseIntError),
    /// Cannot parse float
    #[error("Cannot parse number: {0}")]
    FloatParse(#[from] std::num::ParseFloatError),
    /// Wrong prefix length
    #[error("Wrong prefix length: {0}")]
    PrefixLen(#[from] ipnet::PrefixLenError),
    /// Invalid MAC address
    #[error("Invalid MAC address: {0:?}")]
    InvalidMac(String),
    /// Invalid flow rule or flow entry
    #[error("Invalid flow: {0:?}")]
    InvalidFlow(String),
    /// Invalid port description of `ovs-ofctl show`
    #[error("Invalid port description: {0:?}")]
    InvalidPort(String),
}
