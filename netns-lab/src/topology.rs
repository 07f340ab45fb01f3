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

//! Declarative description of an emulated network.
//!
//! A [`Topology`] is built once, validated by [`crate::Lab::new`], and then instantiated. Nodes
//! are kept in declaration order, and interfaces are named like in Mininet: `<node>-eth<N>`, where
//! `N` starts at 0 for hosts and routers, and at 1 for switches.
//!
//! ```
//! use netns_lab::topology::{LinkSpec, Node, Topology};
//!
//! let mut topo = Topology::new();
//! topo.add_node(Node::host("h1").with_ip("10.0.0.1/24".parse().unwrap()));
//! topo.add_node(Node::host("h2").with_ip("10.0.0.2/24".parse().unwrap()));
//! topo.add_link(LinkSpec::new("h1", "h2")).unwrap();
//! assert!(topo.validate().is_ok());
//! assert_eq!(topo.node("h2").unwrap().ifaces[0].name, "h2-eth0");
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    net::Ipv4Addr,
    str::FromStr,
};

use ipnet::Ipv4Net;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::CONFIG, ParseError};

/// Maximum length of an interface name (`IFNAMSIZ - 1`).
pub const MAX_IFACE_NAME_LEN: usize = 15;

/// Kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// End host, living in its own namespace.
    Host,
    /// Linux router, living in its own namespace with IPv4 forwarding enabled.
    Router,
    /// Open vSwitch bridge in the root namespace.
    Switch,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Host => f.write_str("host"),
            NodeKind::Router => f.write_str("router"),
            NodeKind::Switch => f.write_str("switch"),
        }
    }
}

/// What an OVS bridge does when it has no controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailMode {
    /// Behave like a learning switch, in addition to the installed flows.
    #[default]
    Standalone,
    /// Only forward according to the installed flows.
    Secure,
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailMode::Standalone => f.write_str("standalone"),
            FailMode::Secure => f.write_str("secure"),
        }
    }
}

/// An Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Generate the MAC address from a number, like Mininet does with `autoSetMacs`. The number
    /// `1` results in `00:00:00:00:00:01`.
    pub fn from_index(idx: u64) -> Self {
        let b = (idx & 0xffff_ffff_ffff).to_be_bytes();
        Self([b[2], b[3], b[4], b[5], b[6], b[7]])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().map(|b| format!("{b:02x}")).join(":"))
    }
}

impl FromStr for MacAddr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::InvalidMac(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(err());
        }
        let mut mac = [0u8; 6];
        for (b, p) in mac.iter_mut().zip(parts) {
            if p.len() != 2 {
                return Err(err());
            }
            *b = u8::from_str_radix(p, 16).map_err(|_| err())?;
        }
        Ok(Self(mac))
    }
}

/// An interface of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iface {
    /// Name of the interface, e.g., `h1-eth0`.
    pub name: String,
    /// Address and prefix length assigned to the interface.
    pub addr: Option<Ipv4Net>,
    /// Fixed MAC address. If `None`, the kernel chooses a random one.
    pub mac: Option<MacAddr>,
    /// Port number on the node. For switches, this is the OpenFlow port number.
    pub port: u16,
}

/// A node in the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Name of the node.
    pub name: String,
    /// Kind of the node.
    pub kind: NodeKind,
    /// Address of the first interface, if the link does not specify one.
    pub ip: Option<Ipv4Net>,
    /// MAC address of the first interface, if the link does not specify one.
    pub mac: Option<MacAddr>,
    /// Default gateway installed on hosts.
    pub default_gateway: Option<Ipv4Addr>,
    /// Fail mode of switches.
    pub fail_mode: FailMode,
    /// All interfaces, in the order they were created.
    pub ifaces: Vec<Iface>,
    next_port: u16,
}

impl Node {
    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ip: None,
            mac: None,
            default_gateway: None,
            fail_mode: FailMode::default(),
            ifaces: Vec::new(),
            next_port: if kind == NodeKind::Switch { 1 } else { 0 },
        }
    }

    /// Create a new host.
    pub fn host(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Host)
    }

    /// Create a new router.
    pub fn router(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Router)
    }

    /// Create a new switch (running in standalone mode).
    pub fn switch(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Switch)
    }

    /// Set the address of the first interface.
    pub fn with_ip(mut self, ip: Ipv4Net) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the MAC address of the first interface.
    pub fn with_mac(mut self, mac: MacAddr) -> Self {
        self.mac = Some(mac);
        self
    }

    /// Set the default gateway.
    pub fn with_default_route(mut self, via: Ipv4Addr) -> Self {
        self.default_gateway = Some(via);
        self
    }

    /// Set the fail mode of a switch.
    pub fn with_fail_mode(mut self, mode: FailMode) -> Self {
        self.fail_mode = mode;
        self
    }

    /// Returns `true` if the node lives in its own network namespace.
    pub fn has_namespace(&self) -> bool {
        self.kind != NodeKind::Switch
    }

    /// Name of the network namespace of the node, or `None` for switches.
    pub fn namespace(&self) -> Option<String> {
        self.has_namespace()
            .then(|| format!("{}{}", CONFIG.lab.namespace_prefix, self.name))
    }

    /// Get an interface by its name.
    pub fn iface(&self, name: &str) -> Option<&Iface> {
        self.ifaces.iter().find(|i| i.name == name)
    }

    /// Names of all interfaces, in creation order.
    pub fn iface_names(&self) -> Vec<&str> {
        self.ifaces.iter().map(|i| i.name.as_str()).collect()
    }

    /// The first interface, or `None` if the node is not connected.
    pub fn default_iface(&self) -> Option<&Iface> {
        self.ifaces.first()
    }

    /// The address of the first interface (without prefix length).
    pub fn default_addr(&self) -> Option<Ipv4Addr> {
        self.default_iface().and_then(|i| i.addr).map(|a| a.addr())
    }
}

/// Description of a link that should be added to the topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSpec {
    /// First node
    pub node1: String,
    /// Second node
    pub node2: String,
    /// Interface name on the first node
    pub iface1: Option<String>,
    /// Interface name on the second node
    pub iface2: Option<String>,
    /// Address of the first node's interface
    pub ip1: Option<Ipv4Net>,
    /// Address of the second node's interface
    pub ip2: Option<Ipv4Net>,
}

impl LinkSpec {
    /// Connect `node1` and `node2`.
    pub fn new(node1: impl Into<String>, node2: impl Into<String>) -> Self {
        Self {
            node1: node1.into(),
            node2: node2.into(),
            ..Default::default()
        }
    }

    /// Set the names of both interfaces.
    pub fn iface_names(mut self, iface1: impl Into<String>, iface2: impl Into<String>) -> Self {
        self.iface1 = Some(iface1.into());
        self.iface2 = Some(iface2.into());
        self
    }

    /// Set the addresses of both interfaces.
    pub fn ips(mut self, ip1: Ipv4Net, ip2: Ipv4Net) -> Self {
        self.ip1 = Some(ip1);
        self.ip2 = Some(ip2);
        self
    }
}

/// One side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    /// Name of the node
    pub node: String,
    /// Name of the interface
    pub iface: String,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.iface)
    }
}

/// A link (veth pair) between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link(pub Endpoint, pub Endpoint);

/// A static route installed on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Node on which the route is installed
    pub node: String,
    /// Destination network
    pub dst: Ipv4Net,
    /// Next-hop address
    pub via: Ipv4Addr,
    /// Output interface
    pub dev: Option<String>,
}

impl Route {
    /// Create a new route on `node`.
    pub fn new(node: impl Into<String>, dst: Ipv4Net, via: Ipv4Addr) -> Self {
        Self {
            node: node.into(),
            dst,
            via,
            dev: None,
        }
    }

    /// Set the output interface.
    pub fn dev(mut self, dev: impl Into<String>) -> Self {
        self.dev = Some(dev.into());
        self
    }
}

/// Formats the route as understood by `ip route`, e.g., `10.0.2.0/24 via 10.0.1.2 dev r1-eth1`.
impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.dst, self.via)?;
        if let Some(dev) = &self.dev {
            write!(f, " dev {dev}")?;
        }
        Ok(())
    }
}

/// The topology of an emulated network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    auto_set_macs: bool,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign MAC addresses to hosts automatically: the n-th host (counting from 1) gets the MAC
    /// address `n`, unless it has a MAC address set explicitly. This must be called before adding
    /// links.
    pub fn auto_set_macs(&mut self) {
        self.auto_set_macs = true;
    }

    /// Add a node to the topology. Nodes are kept in the order they are added.
    pub fn add_node(&mut self, mut node: Node) {
        if self.auto_set_macs && node.kind == NodeKind::Host && node.mac.is_none() {
            let idx = self.hosts().count() as u64 + 1;
            node.mac = Some(MacAddr::from_index(idx));
        }
        self.nodes.push(node);
    }

    /// Add a link between two existing nodes. Missing interface names are generated, and
    /// missing addresses are taken from the node (first interface only).
    pub fn add_link(&mut self, spec: LinkSpec) -> Result<&Link, TopologyError> {
        if spec.node1 == spec.node2 {
            return Err(TopologyError::SelfLink(spec.node1));
        }
        let ep1 = self.add_iface(&spec.node1, spec.iface1, spec.ip1)?;
        let ep2 = self.add_iface(&spec.node2, spec.iface2, spec.ip2)?;
        let idx = self.links.len();
        self.links.push(Link(ep1, ep2));
        Ok(&self.links[idx])
    }

    fn add_iface(
        &mut self,
        node: &str,
        name: Option<String>,
        addr: Option<Ipv4Net>,
    ) -> Result<Endpoint, TopologyError> {
        let n = self
            .nodes
            .iter_mut()
            .find(|n| n.name == node)
            .ok_or_else(|| TopologyError::NodeNotFound(node.to_string()))?;
        let port = n.next_port;
        n.next_port += 1;
        let first = n.ifaces.is_empty();
        let iface = Iface {
            name: name.unwrap_or_else(|| format!("{}-eth{}", n.name, port)),
            addr: addr.or(if first { n.ip } else { None }),
            mac: if first { n.mac } else { None },
            port,
        };
        let ep = Endpoint {
            node: n.name.clone(),
            iface: iface.name.clone(),
        };
        n.ifaces.push(iface);
        Ok(ep)
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All links in declaration order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Get a node by its name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Get the interface of a node.
    pub fn iface(&self, node: &str, iface: &str) -> Option<&Iface> {
        self.node(node).and_then(|n| n.iface(iface))
    }

    /// Iterate over all hosts.
    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Host)
    }

    /// Iterate over all routers.
    pub fn routers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Router)
    }

    /// Iterate over all switches.
    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Switch)
    }

    /// Find the node that owns a given address.
    pub fn node_by_addr(&self, addr: Ipv4Addr) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.ifaces.iter().any(|i| i.addr.map(|a| a.addr()) == Some(addr)))
    }

    /// Check that the topology can be instantiated. See [`TopologyError`] for all conditions that
    /// are checked.
    pub fn validate(&self) -> Result<(), TopologyError> {
        // unique node names
        let mut names = HashSet::new();
        for n in self.nodes.iter() {
            if !names.insert(n.name.as_str()) {
                return Err(TopologyError::DuplicateNode(n.name.clone()));
            }
        }

        // unique and valid interface names
        let mut iface_names = HashSet::new();
        for (n, i) in self.nodes.iter().flat_map(|n| n.ifaces.iter().map(move |i| (n, i))) {
            if i.name.is_empty() || i.name.len() > MAX_IFACE_NAME_LEN {
                return Err(TopologyError::InvalidIfaceName(i.name.clone()));
            }
            if !iface_names.insert(i.name.as_str()) {
                return Err(TopologyError::DuplicateIface(i.name.clone()));
            }
            if n.kind == NodeKind::Switch && i.addr.is_some() {
                return Err(TopologyError::AddressOnSwitch(n.name.clone(), i.name.clone()));
            }
        }

        // both endpoints of a link must be in the same subnet
        for Link(a, b) in self.links.iter() {
            let a_addr = self.iface(&a.node, &a.iface).and_then(|i| i.addr);
            let b_addr = self.iface(&b.node, &b.iface).and_then(|i| i.addr);
            if let (Some(a_addr), Some(b_addr)) = (a_addr, b_addr) {
                if a_addr.trunc() != b_addr.trunc() {
                    return Err(TopologyError::SubnetMismatch(
                        a.clone(),
                        a_addr,
                        b.clone(),
                        b_addr,
                    ));
                }
            }
        }

        // host parts must be valid and unique within each subnet
        let mut used: HashMap<Ipv4Addr, &str> = HashMap::new();
        for i in self.nodes.iter().flat_map(|n| n.ifaces.iter()) {
            let Some(addr) = i.addr else { continue };
            if addr.prefix_len() < 31
                && (addr.addr() == addr.network() || addr.addr() == addr.broadcast())
            {
                return Err(TopologyError::InvalidHostPart(i.name.clone(), addr));
            }
            if let Some(other) = used.insert(addr.addr(), i.name.as_str()) {
                return Err(TopologyError::AddressCollision(
                    addr.addr(),
                    other.to_string(),
                    i.name.clone(),
                ));
            }
        }

        // default gateways must be directly reachable
        for n in self.nodes.iter() {
            if let Some(gw) = n.default_gateway {
                if !n
                    .ifaces
                    .iter()
                    .filter_map(|i| i.addr)
                    .any(|a| a.contains(&gw))
                {
                    return Err(TopologyError::UnreachableGateway(n.name.clone(), gw));
                }
            }
        }

        Ok(())
    }
}

/// Errors in the description of a topology.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    /// A link or lookup refers to a node that does not exist.
    #[error("Node {0} does not exist")]
    NodeNotFound(String),
    /// Two nodes with the same name.
    #[error("Node {0} is declared twice")]
    DuplicateNode(String),
    /// A link connects a node with itself.
    #[error("Node {0} cannot be connected to itself")]
    SelfLink(String),
    /// Two interfaces with the same name.
    #[error("Interface {0} is declared twice")]
    DuplicateIface(String),
    /// Interface name is empty or too long for the kernel.
    #[error("Invalid interface name {0:?} (must have 1 to 15 characters)")]
    InvalidIfaceName(String),
    /// Switch ports must not be addressed.
    #[error("Switch {0} cannot have an address on {1}")]
    AddressOnSwitch(String, String),
    /// Both ends of a link are addressed in different subnets.
    #[error("{0} ({1}) and {2} ({3}) are not in the same subnet")]
    SubnetMismatch(Endpoint, Ipv4Net, Endpoint, Ipv4Net),
    /// The address is the network or broadcast address of its subnet.
    #[error("Interface {0} uses the network or broadcast address {1}")]
    InvalidHostPart(String, Ipv4Net),
    /// Two interfaces have the same address.
    #[error("Address {0} is used by both {1} and {2}")]
    AddressCollision(Ipv4Addr, String, String),
    /// The default gateway is not in any connected subnet.
    #[error("Default gateway {1} of {0} is not in a connected subnet")]
    UnreachableGateway(String, Ipv4Addr),
}
