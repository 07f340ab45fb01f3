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

use std::net::Ipv4Addr;

use maplit::hashmap;
use netns_lab::topology::Topology;
use pretty_assertions::assert_eq;

use super::MockExec;
use crate::{
    experiment::routing::{self, arp_pins, static_routes},
    recorder::RULE_WIDTH,
};

const PING_REPLY: &str = include_str!("files/ping_reply.txt");
const PING_TIMEOUT: &str = include_str!("files/ping_timeout.txt");
const ROUTE_R1: &str = include_str!("files/route_r1.txt");
const ROUTE_R2: &str = include_str!("files/route_r2.txt");
const ARP_H1: &str = include_str!("files/arp_h1.txt");

/// Executor for a successful run of the experiment.
fn exec(topo: &Topology) -> MockExec {
    MockExec::new(hashmap! {
        ("h1", "ping -c 1 10.0.2.2") => PING_REPLY,
        ("h2", "ping -c 1 10.0.2.2") => PING_REPLY,
        ("h3", "ping -c 1 10.0.0.3") => PING_TIMEOUT,
        ("r1", "route -n") => ROUTE_R1,
        ("r2", "route -n") => ROUTE_R2,
        ("h1", "arp -n") => ARP_H1,
    })
    .with_macs(topo)
}

#[test]
fn topology() {
    let topo = routing::topology().unwrap();
    topo.validate().unwrap();
    assert_eq!(
        topo.node("h1").unwrap().default_addr(),
        Some(Ipv4Addr::new(10, 0, 0, 3))
    );
    assert_eq!(
        topo.node("h2").unwrap().default_gateway,
        Some(Ipv4Addr::new(10, 0, 3, 4))
    );
    assert_eq!(
        topo.node("r1").unwrap().iface_names(),
        vec!["r1-eth0", "r1-eth1", "r1-eth2"]
    );
    assert_eq!(
        topo.node("r2").unwrap().iface_names(),
        vec!["r2-eth0", "r2-eth1"]
    );
    assert_eq!(
        topo.iface("r1", "r1-eth2").unwrap().addr,
        Some("10.0.3.4/24".parse().unwrap())
    );
}

#[test]
fn routes() {
    let routes = static_routes()
        .unwrap()
        .into_iter()
        .map(|r| format!("{}: {r}", r.node))
        .collect::<Vec<_>>();
    assert_eq!(
        routes,
        vec![
            "r1: 10.0.2.0/24 via 10.0.1.2 dev r1-eth1",
            "r2: 10.0.0.0/24 via 10.0.1.1 dev r2-eth0",
            "r2: 10.0.3.0/24 via 10.0.1.1 dev r2-eth0",
        ]
    );
}

#[test]
fn pins() {
    let topo = routing::topology().unwrap();
    let pins = arp_pins(&topo, &static_routes().unwrap())
        .into_iter()
        .map(|p| {
            format!(
                "{}: {} -> {}:{} dev {}",
                p.node, p.ip, p.target.node, p.target.iface, p.dev
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        pins,
        vec![
            "h1: 10.0.0.1 -> r1:r1-eth0 dev h1-eth0",
            "h2: 10.0.3.4 -> r1:r1-eth2 dev h2-eth0",
            "h3: 10.0.2.1 -> r2:r2-eth1 dev h3-eth0",
            "r1: 10.0.0.3 -> h1:h1-eth0 dev r1-eth0",
            "r1: 10.0.1.2 -> r2:r2-eth0 dev r1-eth1",
            "r1: 10.0.3.2 -> h2:h2-eth0 dev r1-eth2",
            "r2: 10.0.1.1 -> r1:r1-eth1 dev r2-eth0",
            "r2: 10.0.2.2 -> h3:h3-eth0 dev r2-eth1",
        ]
    );
}

#[test_log::test(tokio::test)]
async fn router_sysctls() {
    let topo = routing::topology().unwrap();
    let exec = MockExec::default();
    routing::tune_router_sysctls(&exec, topo.node("r2").unwrap())
        .await
        .unwrap();
    let cmds = exec.commands_on("r2");
    // forwarding, 4 global, 2 default, and 4 for lo and each of the two interfaces
    assert_eq!(cmds.len(), 1 + 4 + 2 + 3 * 4);
    assert!(cmds.contains(&String::from("sysctl -w net.ipv4.conf.lo.rp_filter=0")));
    assert_eq!(cmds[0], "sysctl -w net.ipv4.ip_forward=1");
    assert_eq!(cmds[1], "sysctl -w net.ipv4.conf.all.rp_filter=0");
    assert_eq!(cmds[2], "sysctl -w net.ipv4.conf.default.rp_filter=0");
    assert!(cmds.contains(&String::from("sysctl -w net.ipv4.conf.all.arp_ignore=1")));
    assert!(!cmds.contains(&String::from("sysctl -w net.ipv4.conf.default.arp_ignore=1")));
    assert_eq!(
        cmds.last().unwrap(),
        "sysctl -w net.ipv4.conf.r2-eth1.arp_announce=2"
    );
}

#[test_log::test(tokio::test)]
async fn verify_routes() {
    let topo = routing::topology().unwrap();
    let routes = static_routes().unwrap();

    let exec = self::exec(&topo);
    assert!(routing::verify_routes(&exec, &routes).await.unwrap());

    // r2 did not install its routes
    let exec = MockExec::default()
        .respond("r1", "route -n", ROUTE_R1)
        .respond("r2", "route -n", ROUTE_R1);
    assert!(!routing::verify_routes(&exec, &routes).await.unwrap());

    // unparseable tables are not fatal
    let exec = MockExec::default().respond("r1", "route -n", "garbage");
    assert!(!routing::verify_routes(&exec, &routes).await.unwrap());
}

#[test_log::test(tokio::test)]
async fn verify_arp() {
    let topo = routing::topology().unwrap();
    let pins = arp_pins(&topo, &static_routes().unwrap());
    let h1_pins = pins
        .iter()
        .filter(|p| p.node == "h1")
        .cloned()
        .collect::<Vec<_>>();

    // `10.0.0.1` is pinned on h1-eth0 (flags `CM`)
    let exec = exec(&topo);
    assert!(routing::verify_arp(&exec, &h1_pins).await.unwrap());
    // the other nodes have empty tables
    assert!(!routing::verify_arp(&exec, &pins).await.unwrap());

    // an entry that was only learned is not enough
    let exec = MockExec::default().respond(
        "h1",
        "arp -n",
        &ARP_H1.replace("CM ", "C  "),
    );
    assert!(!routing::verify_arp(&exec, &h1_pins).await.unwrap());

    // unparseable tables are not fatal
    let exec = MockExec::default().respond("h1", "arp -n", "garbage");
    assert!(!routing::verify_arp(&exec, &h1_pins).await.unwrap());
}

#[test]
fn loopback_first() {
    let topo = routing::topology().unwrap();
    assert_eq!(
        routing::all_ifaces(topo.node("r1").unwrap()),
        vec!["lo", "r1-eth0", "r1-eth1", "r1-eth2"]
    );
}

#[test_log::test(tokio::test)]
async fn configuration_order() {
    let topo = routing::topology().unwrap();
    let exec = exec(&topo);
    let dir = tempfile::tempdir().unwrap();
    routing::run(&exec, &topo, dir.path().join("result1.txt"))
        .await
        .unwrap();

    let cmds = exec.commands();
    let pos = |node: &str, cmd: &str| {
        cmds.iter()
            .position(|(n, c)| n == node && c == cmd)
            .unwrap_or_else(|| panic!("[{node}] {cmd} was not executed"))
    };

    let forwarding = pos("r1", "sysctl -w net.ipv4.ip_forward=1");
    let flush = pos("r1", "ip neigh flush dev r1-eth0");
    let route = pos("r1", "ip route replace 10.0.2.0/24 via 10.0.1.2 dev r1-eth1");
    let pin = pos(
        "h1",
        "ip neigh replace 10.0.0.1 lladdr 00:00:00:00:00:64 dev h1-eth0 nud permanent",
    );
    let ping = pos("h1", "ping -c 1 10.0.2.2");
    // `route -n` and `arp -n` are also used to verify the configuration
    let table = cmds
        .iter()
        .rposition(|(n, c)| n == "r1" && c == "route -n")
        .unwrap();
    let arp = cmds
        .iter()
        .rposition(|(n, c)| n == "r2" && c == "arp -n")
        .unwrap();
    assert_eq!(forwarding, 0);
    assert!(forwarding < flush);
    assert!(pos("r1", "ip neigh flush dev lo") < flush);
    assert!(flush < route);
    assert!(route < pin);
    assert!(pin < ping);
    assert!(ping < table);
    assert!(table < arp);

    // all neighbor entries point to the MAC address of the target interface.
    assert!(cmds.contains(&(
        String::from("r2"),
        String::from(
            "ip neigh replace 10.0.2.2 lladdr 00:00:00:00:00:6b dev r2-eth1 nud permanent"
        )
    )));
}

#[test_log::test(tokio::test)]
async fn result_file() {
    let topo = routing::topology().unwrap();
    let exec = exec(&topo);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result1.txt");
    let rec = routing::run(&exec, &topo, &path).await.unwrap();

    // four pings, two routing tables, five ARP tables
    assert_eq!(rec.blocks(), 11);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, rec.contents().unwrap());
    let dashes = "-".repeat(RULE_WIDTH);
    let equals = "=".repeat(RULE_WIDTH);

    let expected_start = format!(
        "Experiment 1: IP Routing - Ping Test Results\n{equals}\n\n\
         Test 1: h1 (10.0.0.3) to h3 (10.0.2.2)\n{dashes}\n{PING_REPLY}\n\n\
         Test 2: h2 (10.0.3.2) to h3 (10.0.2.2)\n{dashes}\n{PING_REPLY}\n\n\
         Test 3: h3 (10.0.2.2) to h1 (10.0.0.3)\n{dashes}\n{PING_TIMEOUT}\n\n\
         Test 4: h3 (10.0.2.2) to h2 (10.0.3.2)\n{dashes}\n\n\
         \n{equals}\nRouting Tables\n{equals}\n\n\
         Router r1 routing table:\n{dashes}\n{ROUTE_R1}\n\n\
         Router r2 routing table:\n{dashes}\n{ROUTE_R2}\n\
         \n{equals}\nARP Tables\n{equals}\n\n\
         h1 ARP table:\n{dashes}\n{ARP_H1}\n\n\
         h2 ARP table:\n{dashes}\n\n\n"
    );
    assert_eq!(&content[..expected_start.len()], expected_start);
    assert!(content.ends_with(&format!("r2 ARP table:\n{dashes}\n\n\n")));
}

#[test_log::test(tokio::test)]
async fn result_file_is_overwritten() {
    let topo = routing::topology().unwrap();
    let exec = exec(&topo);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result1.txt");
    std::fs::write(&path, "results of a previous run\n").unwrap();

    routing::run(&exec, &topo, &path).await.unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("Experiment 1: IP Routing - Ping Test Results\n"));
    assert!(!content.contains("previous run"));
}
