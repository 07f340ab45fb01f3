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

//! Experiment 1: IPv4 routing between four subnets with two Linux routers.
//!
//! ```text
//! h1 -- r1 -- r2 -- h3
//!       |
//!       h2
//! ```
//!
//! Both routers get static routes for the subnets they are not attached to. All hosts and routers
//! pin the MAC addresses of their gateways and next hops, so the ARP tables in the result file are
//! deterministic.

use std::{
    collections::{BTreeMap, HashMap},
    net::Ipv4Addr,
    path::Path,
};

use itertools::Itertools;
use netns_lab::{
    topology::{Endpoint, LinkSpec, MacAddr, Node, NodeKind, Route, Topology},
    LabError, NodeExec,
};

use super::{probes, ExperimentError};
use crate::recorder::ResultRecorder;

/// Default name of the result file.
pub const RESULT_FILE: &str = "result1.txt";

/// Title of the result file.
pub const TITLE: &str = "Experiment 1: IP Routing - Ping Test Results";

/// Connectivity checks, in the order they are recorded.
pub const PING_TESTS: [(&str, &str); 4] = [("h1", "h3"), ("h2", "h3"), ("h3", "h1"), ("h3", "h2")];

/// Routers whose routing tables are recorded.
pub const ROUTERS: [&str; 2] = ["r1", "r2"];

/// Nodes whose ARP tables are recorded.
pub const ARP_NODES: [&str; 5] = ["h1", "h2", "h3", "r1", "r2"];

/// Kernel parameters that are set on every router, globally and for each interface.
const ROUTER_SYSCTLS: [(&str, &str); 4] = [
    ("rp_filter", "0"),
    ("proxy_arp", "0"),
    ("arp_ignore", "1"),
    ("arp_announce", "2"),
];

/// Build the topology of the experiment.
pub fn topology() -> Result<Topology, ExperimentError> {
    let mut topo = Topology::new();
    topo.add_node(Node::router("r1"));
    topo.add_node(Node::router("r2"));
    topo.add_node(
        Node::host("h1")
            .with_ip("10.0.0.3/24".parse()?)
            .with_default_route(Ipv4Addr::new(10, 0, 0, 1)),
    );
    topo.add_node(
        Node::host("h2")
            .with_ip("10.0.3.2/24".parse()?)
            .with_default_route(Ipv4Addr::new(10, 0, 3, 4)),
    );
    topo.add_node(
        Node::host("h3")
            .with_ip("10.0.2.2/24".parse()?)
            .with_default_route(Ipv4Addr::new(10, 0, 2, 1)),
    );

    let links = [
        ("h1", "r1", "h1-eth0", "r1-eth0", "10.0.0.3/24", "10.0.0.1/24"),
        ("r1", "r2", "r1-eth1", "r2-eth0", "10.0.1.1/24", "10.0.1.2/24"),
        ("r2", "h3", "r2-eth1", "h3-eth0", "10.0.2.1/24", "10.0.2.2/24"),
        ("h2", "r1", "h2-eth0", "r1-eth2", "10.0.3.2/24", "10.0.3.4/24"),
    ];
    for (a, b, a_iface, b_iface, a_ip, b_ip) in links {
        topo.add_link(
            LinkSpec::new(a, b)
                .iface_names(a_iface, b_iface)
                .ips(a_ip.parse()?, b_ip.parse()?),
        )?;
    }
    Ok(topo)
}

/// The static routes of both routers.
pub fn static_routes() -> Result<Vec<Route>, ExperimentError> {
    let r1 = Ipv4Addr::new(10, 0, 1, 1);
    let r2 = Ipv4Addr::new(10, 0, 1, 2);
    Ok(vec![
        Route::new("r1", "10.0.2.0/24".parse()?, r2).dev("r1-eth1"),
        Route::new("r2", "10.0.0.0/24".parse()?, r1).dev("r2-eth0"),
        Route::new("r2", "10.0.3.0/24".parse()?, r1).dev("r2-eth0"),
    ])
}

/// Make the forwarding and ARP behavior of a router deterministic.
pub async fn tune_router_sysctls<E>(exec: &E, router: &Node) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    let name = router.name.as_str();
    exec.sysctl(name, "net.ipv4.ip_forward", "1").await?;
    for (key, value) in ROUTER_SYSCTLS {
        exec.sysctl(name, &format!("net.ipv4.conf.all.{key}"), value)
            .await?;
        // arp_ignore and arp_announce are only set globally for `all`
        if key == "rp_filter" || key == "proxy_arp" {
            exec.sysctl(name, &format!("net.ipv4.conf.default.{key}"), value)
                .await?;
        }
    }
    for iface in all_ifaces(router) {
        for (key, value) in ROUTER_SYSCTLS {
            exec.sysctl(name, &format!("net.ipv4.conf.{iface}.{key}"), value)
                .await?;
        }
    }
    Ok(())
}

/// All interfaces of a node, starting with the loopback interface.
pub fn all_ifaces(node: &Node) -> Vec<&str> {
    std::iter::once("lo").chain(node.iface_names()).collect()
}

/// Remove all neighbor entries on all router interfaces.
pub async fn flush_neighbors<E>(exec: &E, topo: &Topology) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    for router in topo.routers() {
        for iface in all_ifaces(router) {
            exec.neigh_flush(&router.name, iface).await?;
        }
    }
    Ok(())
}

/// Install all static routes.
pub async fn configure_routes<E>(exec: &E, routes: &[Route]) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    log::info!("*** Configuring routes");
    for route in routes {
        exec.route_replace(route).await?;
        log::info!("{}: Added route to {}", route.node, route);
    }
    log::info!("*** Routes configured successfully");
    Ok(())
}

/// A permanent neighbor entry on `node`, pointing to the MAC address of `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPin {
    /// Node on which the entry is installed
    pub node: String,
    /// Address of the neighbor
    pub ip: Ipv4Addr,
    /// Interface whose MAC address is used
    pub target: Endpoint,
    /// Interface on `node` through which the neighbor is reachable
    pub dev: String,
}

/// Compute the neighbor entries to pin: every host pins its default gateway, and every router
/// pins the hosts attached to it and the next hops of its static routes.
pub fn arp_pins(topo: &Topology, routes: &[Route]) -> Vec<ArpPin> {
    let mut pins = Vec::new();

    for host in topo.hosts() {
        let (Some(gw), Some(dev)) = (host.default_gateway, host.default_iface()) else {
            continue;
        };
        if let Some(target) = owner(topo, gw) {
            pins.push(ArpPin {
                node: host.name.clone(),
                ip: gw,
                target,
                dev: dev.name.clone(),
            });
        }
    }

    for router in topo.routers() {
        let next_hops: Vec<Ipv4Addr> = routes
            .iter()
            .filter(|r| r.node == router.name)
            .map(|r| r.via)
            .collect();
        for iface in router.ifaces.iter() {
            let Some(peer) = peer(topo, &router.name, &iface.name) else {
                continue;
            };
            let Some(peer_node) = topo.node(&peer.node) else {
                continue;
            };
            let Some(ip) = topo
                .iface(&peer.node, &peer.iface)
                .and_then(|i| i.addr)
                .map(|a| a.addr())
            else {
                continue;
            };
            if peer_node.kind == NodeKind::Host || next_hops.contains(&ip) {
                pins.push(ArpPin {
                    node: router.name.clone(),
                    ip,
                    target: peer,
                    dev: iface.name.clone(),
                });
            }
        }
    }

    pins
}

/// The interface that has the address `ip`.
fn owner(topo: &Topology, ip: Ipv4Addr) -> Option<Endpoint> {
    topo.nodes().iter().find_map(|n| {
        n.ifaces
            .iter()
            .find(|i| i.addr.map(|a| a.addr()) == Some(ip))
            .map(|i| Endpoint {
                node: n.name.clone(),
                iface: i.name.clone(),
            })
    })
}

/// The other end of the link attached to `node:iface`.
fn peer(topo: &Topology, node: &str, iface: &str) -> Option<Endpoint> {
    topo.links().iter().find_map(|l| {
        if l.0.node == node && l.0.iface == iface {
            Some(l.1.clone())
        } else if l.1.node == node && l.1.iface == iface {
            Some(l.0.clone())
        } else {
            None
        }
    })
}

/// Pin all neighbor entries of [`arp_pins`], using the MAC addresses of the running interfaces.
pub async fn configure_arp<E>(
    exec: &E,
    topo: &Topology,
    routes: &[Route],
) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    log::info!("*** Configuring static ARP entries");
    let pins = arp_pins(topo, routes);

    let mut macs: HashMap<Endpoint, MacAddr> = HashMap::new();
    for target in pins.iter().map(|p| &p.target).unique() {
        let mac = exec.mac(&target.node, &target.iface).await?;
        macs.insert(target.clone(), mac);
    }

    let mut groups: BTreeMap<&str, Vec<&ArpPin>> = BTreeMap::new();
    for pin in pins.iter() {
        groups.entry(pin.node.as_str()).or_default().push(pin);
    }
    for (node, pins) in groups {
        for pin in pins.iter() {
            exec.neigh_replace(node, pin.ip, macs[&pin.target], &pin.dev)
                .await?;
        }
        log::info!(
            "{node}: pinned {}",
            pins.iter()
                .map(|p| format!("{} ({})", p.ip, p.target.node))
                .join(", ")
        );
    }
    log::info!("*** ARP entries configured successfully");
    Ok(())
}

/// Check that every pinned neighbor shows up in `arp -n` as a permanent entry on the right
/// interface. Missing entries are only logged. Returns `true` if all entries were found.
pub async fn verify_arp<E>(exec: &E, pins: &[ArpPin]) -> Result<bool, ExperimentError>
where
    E: NodeExec + ?Sized,
{
    let mut all_found = true;
    let mut groups: BTreeMap<&str, Vec<&ArpPin>> = BTreeMap::new();
    for pin in pins {
        groups.entry(pin.node.as_str()).or_default().push(pin);
    }
    for (node, pins) in groups {
        let table = match exec.arp_entries(node).await {
            Ok(table) => table,
            Err(LabError::Parse(e)) => {
                log::warn!("[{node}] Cannot parse the ARP table: {e}");
                all_found = false;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for pin in pins {
            let found = table.iter().any(|entry| {
                entry.address == pin.ip
                    && entry.iface == pin.dev
                    && entry.is_permanent()
                    && entry.hw_addr.is_some()
            });
            if !found {
                log::warn!("[{node}] neighbor {} on {} is not pinned!", pin.ip, pin.dev);
                all_found = false;
            }
        }
    }
    Ok(all_found)
}

/// Check that all static routes show up in `route -n`. Missing routes are only logged. Returns
/// `true` if all routes were found.
pub async fn verify_routes<E>(exec: &E, routes: &[Route]) -> Result<bool, ExperimentError>
where
    E: NodeExec + ?Sized,
{
    let mut all_found = true;
    let mut groups: BTreeMap<&str, Vec<&Route>> = BTreeMap::new();
    for route in routes {
        groups.entry(route.node.as_str()).or_default().push(route);
    }
    for (node, routes) in groups {
        let table = match exec.routes(node).await {
            Ok(table) => table,
            Err(LabError::Parse(e)) => {
                log::warn!("[{node}] Cannot parse the routing table: {e}");
                all_found = false;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for route in routes {
            let found = table.iter().any(|entry| {
                entry.is_gateway()
                    && entry.gateway == route.via
                    && entry.network().ok() == Some(route.dst)
                    && route.dev.as_ref().map(|d| d == &entry.iface).unwrap_or(true)
            });
            if found {
                log::debug!("[{node}] route {route} is installed");
            } else {
                log::warn!("[{node}] route {route} is missing!");
                all_found = false;
            }
        }
    }
    Ok(all_found)
}

/// Run all connectivity checks and record their output.
pub async fn run_ping_tests<E>(
    exec: &E,
    topo: &Topology,
    rec: &mut ResultRecorder,
) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    log::info!("*** Running ping tests");
    for (i, probe) in probes(topo, &PING_TESTS)?.into_iter().enumerate() {
        let result = probe.run(exec).await?;
        if i > 0 {
            rec.write("\n")?;
        }
        rec.block(
            &format!(
                "Test {}: {} ({}) to {} ({})",
                i + 1,
                probe.src,
                probe.src_addr,
                probe.dst,
                probe.dst_addr
            ),
            &result.output,
        )?;
    }
    Ok(())
}

/// Record the routing tables of the routers and the ARP tables of all nodes.
pub async fn record_tables<E>(exec: &E, rec: &mut ResultRecorder) -> Result<(), ExperimentError>
where
    E: NodeExec + ?Sized,
{
    rec.banner("Routing Tables")?;
    for (i, router) in ROUTERS.iter().enumerate() {
        let table = exec.routing_table(router).await?;
        if i > 0 {
            rec.write("\n")?;
        }
        rec.block(&format!("Router {router} routing table:"), &table)?;
    }

    rec.banner("ARP Tables")?;
    for node in ARP_NODES {
        let table = exec.arp_table(node).await?;
        rec.block(&format!("{node} ARP table:"), &table)?;
        rec.write("\n")?;
    }
    Ok(())
}

/// Run the whole experiment on a running network, and write the results to `output`.
pub async fn run<E>(
    exec: &E,
    topo: &Topology,
    output: impl AsRef<Path>,
) -> Result<ResultRecorder, ExperimentError>
where
    E: NodeExec + ?Sized,
{
    let routes = static_routes()?;

    for router in ROUTERS {
        let node = topo
            .node(router)
            .ok_or_else(|| ExperimentError::MissingNode(router.to_string()))?;
        tune_router_sysctls(exec, node).await?;
    }
    log::info!("*** Tuned sysctls on {}", ROUTERS.join("/"));

    flush_neighbors(exec, topo).await?;
    configure_routes(exec, &routes).await?;
    configure_arp(exec, topo, &routes).await?;
    if !verify_arp(exec, &arp_pins(topo, &routes)).await? {
        log::warn!("Not all neighbor entries are pinned!");
    }
    if !verify_routes(exec, &routes).await? {
        log::warn!("Not all static routes are installed!");
    }

    let mut rec = ResultRecorder::create(output)?;
    rec.header(TITLE)?;
    run_ping_tests(exec, topo, &mut rec).await?;
    record_tables(exec, &mut rec).await?;
    log::info!("*** Ping test results saved to {}", rec.path().display());

    Ok(rec)
}
