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

//! Module for managing Open vSwitch bridges, and for the OpenFlow rules installed on them.
//!
//! Switches are OVS bridges in the root namespace. The switch-side end of each veth pair stays in
//! the root namespace and is attached as OpenFlow port `N` for interface `<switch>-ethN`.

use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    config::CONFIG,
    topology::{Endpoint, Iface, MacAddr, Node},
    Lab, LabCommand, ParseError,
};

/// Priority that OVS assigns to flows without explicit priority.
pub const DEFAULT_PRIORITY: u16 = 32768;

lazy_static! {
    static ref PORT_RE: Regex =
        Regex::new(r"^\s*(\d+|LOCAL)\(([^)]+)\): addr:([0-9a-fA-F:]{17})\s*$").unwrap();
}

fn vsctl<I, A>(args: I) -> LabCommand
where
    I: IntoIterator<Item = A>,
    A: Into<String>,
{
    let mut cmd = LabCommand::root(args);
    cmd.args.insert(0, CONFIG.tools.ovs_vsctl.clone());
    cmd
}

impl<S> Lab<S> {
    /// Create an OVS bridge for every switch and set its fail mode.
    pub(crate) fn plan_bridges(&self) -> Vec<LabCommand> {
        self.topo
            .switches()
            .map(|s| {
                vsctl([
                    "--may-exist",
                    "add-br",
                    s.name.as_str(),
                    "--",
                    "set",
                    "Bridge",
                    s.name.as_str(),
                    format!("fail-mode={}", s.fail_mode).as_str(),
                ])
            })
            .collect()
    }

    /// Attach an interface to the bridge of `switch`, using the port of the interface as OpenFlow
    /// port number.
    pub(crate) fn plan_switch_port(switch: &Node, iface: &Iface) -> LabCommand {
        vsctl([
            "add-port",
            switch.name.as_str(),
            iface.name.as_str(),
            "--",
            "set",
            "Interface",
            iface.name.as_str(),
            format!("ofport_request={}", iface.port).as_str(),
        ])
    }

    /// Delete all bridges, and all veth pairs that have an end in the root namespace.
    pub(crate) fn plan_switch_teardown(&self) -> Vec<LabCommand> {
        let mut plan: Vec<LabCommand> = self
            .topo
            .switches()
            .map(|s| vsctl(["--if-exists", "del-br", s.name.as_str()]))
            .collect();
        // deleting one end removes the pair.
        for link in self.topo.links() {
            if let Some(ep) = [&link.0, &link.1]
                .into_iter()
                .find(|e| self.is_root_endpoint(e))
            {
                plan.push(LabCommand::root([
                    CONFIG.tools.ip.as_str(),
                    "link",
                    "del",
                    ep.iface.as_str(),
                ]));
            }
        }
        plan
    }

    /// Iterate over all link endpoints that stay in the root namespace (i.e., switch ports).
    pub fn root_ifaces(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.topo
            .links()
            .iter()
            .flat_map(|l| [&l.0, &l.1])
            .filter(|e| self.is_root_endpoint(e))
    }

    fn is_root_endpoint(&self, ep: &Endpoint) -> bool {
        self.topo
            .node(&ep.node)
            .map(|n| !n.has_namespace())
            .unwrap_or(false)
    }
}

/// Action of a flow rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowAction {
    /// Drop the packet
    Drop,
    /// Send the packet out of an OpenFlow port
    Output(u16),
    /// Process the packet like a learning switch
    Normal,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::Drop => f.write_str("drop"),
            FlowAction::Output(p) => write!(f, "output:{p}"),
            FlowAction::Normal => f.write_str("normal"),
        }
    }
}

impl FromStr for FlowAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "drop" => Ok(Self::Drop),
            "normal" => Ok(Self::Normal),
            _ => match s.strip_prefix("output:") {
                Some(p) => Ok(Self::Output(p.parse()?)),
                None => Err(ParseError::InvalidFlow(s.clone())),
            },
        }
    }
}

/// A flow rule as passed to `ovs-ofctl add-flow`. Only the input port can be matched.
///
/// ```
/// use netns_lab::{FlowAction, FlowRule};
///
/// let rule = FlowRule::forward(1, 3);
/// assert_eq!(rule.to_string(), "in_port=1,actions=output:3");
/// assert_eq!("in_port=2,actions=drop".parse::<FlowRule>().unwrap(), FlowRule::drop(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowRule {
    /// Match on the OpenFlow input port
    pub in_port: Option<u16>,
    /// Priority of the rule. OVS uses [`DEFAULT_PRIORITY`] if `None`.
    pub priority: Option<u16>,
    /// The action
    pub action: FlowAction,
}

impl FlowRule {
    /// Drop everything that arrives on `in_port`.
    pub fn drop(in_port: u16) -> Self {
        Self {
            in_port: Some(in_port),
            priority: None,
            action: FlowAction::Drop,
        }
    }

    /// Send everything that arrives on `in_port` out of `out_port`.
    pub fn forward(in_port: u16, out_port: u16) -> Self {
        Self {
            in_port: Some(in_port),
            priority: None,
            action: FlowAction::Output(out_port),
        }
    }

    /// Set the priority.
    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = self.priority {
            write!(f, "priority={p},")?;
        }
        if let Some(p) = self.in_port {
            write!(f, "in_port={p},")?;
        }
        write!(f, "actions={}", self.action)
    }
}

impl FromStr for FlowRule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::InvalidFlow(s.to_string());
        let s = s.trim().trim_matches('"');
        let (fields, actions) = s.split_once("actions=").ok_or_else(err)?;
        let mut rule = Self {
            in_port: None,
            priority: None,
            action: actions.parse()?,
        };
        for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match field.split_once('=') {
                Some(("in_port", p)) => rule.in_port = Some(p.parse()?),
                Some(("priority", p)) => rule.priority = Some(p.parse()?),
                _ => return Err(err()),
            }
        }
        Ok(rule)
    }
}

/// A row of `ovs-ofctl dump-flows`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// Flow table
    pub table: u8,
    /// Number of matched packets
    pub n_packets: u64,
    /// Number of matched bytes
    pub n_bytes: u64,
    /// Priority of the flow
    pub priority: u16,
    /// Match fields, like `in_port=2` or `in_port="s1-eth2"`.
    pub matches: Vec<String>,
    /// Actions, like `drop` or `output:3`.
    pub actions: String,
}

/// Fields of `dump-flows` that are statistics and not part of the match.
const FLOW_STATS: &[&str] = &[
    "cookie",
    "duration",
    "idle_age",
    "hard_age",
    "idle_timeout",
    "hard_timeout",
    "importance",
    "reset_counts",
    "send_flow_rem",
];

impl FlowEntry {
    /// Parse the output of `ovs-ofctl dump-flows`. Lines without actions (like the
    /// `NXST_FLOW reply` header) are skipped.
    pub fn from_dump(dump: &str) -> Result<Vec<Self>, ParseError> {
        dump.lines()
            .filter(|l| l.contains("actions="))
            .map(Self::from_line)
            .collect()
    }

    fn from_line(line: &str) -> Result<Self, ParseError> {
        let (fields, actions) = line
            .split_once("actions=")
            .ok_or_else(|| ParseError::InvalidFlow(line.to_string()))?;
        let mut entry = Self {
            table: 0,
            n_packets: 0,
            n_bytes: 0,
            priority: DEFAULT_PRIORITY,
            matches: Vec::new(),
            actions: actions.trim().to_string(),
        };
        for field in fields
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
        {
            let (key, value) = field.split_once('=').unwrap_or((field, ""));
            match key {
                "table" => entry.table = value.parse()?,
                "n_packets" => entry.n_packets = value.parse()?,
                "n_bytes" => entry.n_bytes = value.parse()?,
                "priority" => entry.priority = value.parse()?,
                k if FLOW_STATS.contains(&k) => {}
                _ => entry.matches.push(field.to_string()),
            }
        }
        Ok(entry)
    }

    /// The value of the `in_port` match, without quotes.
    pub fn in_port(&self) -> Option<&str> {
        self.matches
            .iter()
            .find_map(|m| m.strip_prefix("in_port="))
            .map(|p| p.trim_matches('"'))
    }

    /// Check if this entry was installed by `rule`. Newer OVS versions print port names instead of
    /// numbers; those are resolved with `ports`.
    pub fn is_rule(&self, rule: &FlowRule, ports: &[PortDesc]) -> bool {
        let resolve = |p: &str| PortDesc::resolve(ports, p.trim_matches('"'));
        let action = match self.actions.to_lowercase().strip_prefix("output:") {
            Some(p) => resolve(p).map(FlowAction::Output),
            None => self.actions.parse().ok(),
        };
        self.in_port().and_then(resolve) == rule.in_port
            && self.priority == rule.priority.unwrap_or(DEFAULT_PRIORITY)
            && self.matches.len() == usize::from(rule.in_port.is_some())
            && action == Some(rule.action)
    }
}

/// A port as printed by `ovs-ofctl show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDesc {
    /// OpenFlow port number, or `None` for the `LOCAL` port of the bridge
    pub number: Option<u16>,
    /// Name of the interface
    pub name: String,
    /// MAC address of the interface
    pub mac: MacAddr,
}

impl PortDesc {
    /// Parse the output of `ovs-ofctl show`.
    pub fn from_show(show: &str) -> Result<Vec<Self>, ParseError> {
        if !show.contains("OFPT_FEATURES_REPLY") {
            return Err(ParseError::InvalidPort(
                show.lines().next().unwrap_or_default().to_string(),
            ));
        }
        show.lines()
            .filter_map(|l| PORT_RE.captures(l))
            .map(|c| -> Result<Self, ParseError> {
                Ok(Self {
                    number: match &c[1] {
                        "LOCAL" => None,
                        n => Some(n.parse()?),
                    },
                    name: c[2].to_string(),
                    mac: c[3].parse()?,
                })
            })
            .collect()
    }

    /// Resolve a port given by number or by name.
    pub fn resolve(ports: &[Self], port: &str) -> Option<u16> {
        port.parse().ok().or_else(|| {
            ports
                .iter()
                .find(|p| p.name == port)
                .and_then(|p| p.number)
        })
    }
}
