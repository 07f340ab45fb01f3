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

use pretty_assertions::assert_eq;

use crate::{
    node::{ArpEntry, RouteEntry},
    topology::MacAddr,
    ParseError,
};

#[test]
fn route_n() {
    let parsed = RouteEntry::from_table(include_str!("files/route_n.txt")).unwrap();
    assert_eq!(parsed.len(), 4);
    assert_eq!(
        parsed[2],
        RouteEntry {
            destination: "10.0.2.0".parse().unwrap(),
            gateway: "10.0.1.2".parse().unwrap(),
            genmask: "255.255.255.0".parse().unwrap(),
            flags: String::from("UG"),
            metric: 0,
            iface: String::from("r1-eth1"),
        }
    );
    assert!(parsed[2].is_gateway());
    assert!(!parsed[0].is_gateway());
    assert_eq!(
        parsed
            .iter()
            .map(|r| r.network().unwrap())
            .collect::<Vec<_>>(),
        vec![
            "10.0.0.0/24".parse().unwrap(),
            "10.0.1.0/24".parse().unwrap(),
            "10.0.2.0/24".parse().unwrap(),
            "10.0.3.0/24".parse().unwrap(),
        ]
    );
}

#[test]
fn route_n_default_route() {
    let table = "\
Kernel IP routing table
Destination     Gateway         Genmask         Flags Metric Ref    Use Iface
0.0.0.0         10.0.0.1        0.0.0.0         UG    0      0        0 h1-eth0
10.0.0.0        0.0.0.0         255.255.255.0   U     0      0        0 h1-eth0";
    let parsed = RouteEntry::from_table(table).unwrap();
    assert_eq!(parsed[0].network().unwrap(), "0.0.0.0/0".parse().unwrap());
    assert_eq!(parsed[0].gateway, "10.0.0.1".parse::<std::net::Ipv4Addr>().unwrap());
    assert_eq!(parsed[1].iface, "h1-eth0");
}

#[test]
fn route_n_invalid_header() {
    assert!(matches!(
        RouteEntry::from_table("route: command not found"),
        Err(ParseError::TableParse(_))
    ));
}

#[test]
fn arp_n() {
    let parsed = ArpEntry::from_table(include_str!("files/arp_n.txt")).unwrap();
    assert_eq!(
        parsed,
        vec![
            ArpEntry {
                address: "10.0.0.3".parse().unwrap(),
                hw_addr: Some(MacAddr::from_index(1)),
                flags: String::from("CM"),
                iface: String::from("r1-eth0"),
            },
            ArpEntry {
                address: "10.0.1.2".parse().unwrap(),
                hw_addr: Some("9a:3c:51:0e:7b:22".parse().unwrap()),
                flags: String::from("CM"),
                iface: String::from("r1-eth1"),
            },
            ArpEntry {
                address: "10.0.3.2".parse().unwrap(),
                hw_addr: Some(MacAddr::from_index(2)),
                flags: String::from("C"),
                iface: String::from("r1-eth2"),
            },
        ]
    );
    assert!(parsed[0].is_permanent());
    assert!(!parsed[2].is_permanent());
}

#[test]
fn arp_n_incomplete() {
    let table = "\
Address                  HWtype  HWaddress           Flags Mask            Iface
10.0.0.9                         (incomplete)                              h1-eth0";
    let parsed = ArpEntry::from_table(table).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].hw_addr, None);
    assert_eq!(parsed[0].iface, "h1-eth0");
}

#[test]
fn arp_n_empty() {
    assert_eq!(ArpEntry::from_table("").unwrap(), Vec::new());
}
