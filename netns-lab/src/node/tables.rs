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

//! Typed rows of the kernel routing table and the neighbor (ARP) table.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use super::{table_parser::parse_table, ParseError};
use crate::topology::MacAddr;

/// A row of `route -n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Destination network
    pub destination: Ipv4Addr,
    /// Next-hop, or `0.0.0.0` for directly connected networks
    pub gateway: Ipv4Addr,
    /// Netmask of the destination
    pub genmask: Ipv4Addr,
    /// Route flags, e.g., `UG`
    pub flags: String,
    /// Route metric
    pub metric: u32,
    /// Output interface
    pub iface: String,
}

impl RouteEntry {
    /// Parse the output of `route -n`.
    pub fn from_table(table: &str) -> Result<Vec<Self>, ParseError> {
        parse_table(
            table,
            [
                "Destination",
                "Gateway",
                "Genmask",
                "Flags",
                "Metric",
                "Ref",
                "Use",
                "Iface",
            ],
        )?
        .into_iter()
        .map(
            |[destination, gateway, genmask, flags, metric, _, _, iface]| -> Result<Self, ParseError> {
                Ok(Self {
                    destination: destination.parse()?,
                    gateway: gateway.parse()?,
                    genmask: genmask.parse()?,
                    flags: flags.to_string(),
                    metric: metric.parse()?,
                    iface: iface.to_string(),
                })
            },
        )
        .collect()
    }

    /// The destination network.
    pub fn network(&self) -> Result<Ipv4Net, ParseError> {
        Ok(Ipv4Net::with_netmask(self.destination, self.genmask)?)
    }

    /// Returns `true` if the route points to a gateway (flag `G`).
    pub fn is_gateway(&self) -> bool {
        self.flags.contains('G')
    }
}

/// A row of `arp -n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    /// IP address of the neighbor
    pub address: Ipv4Addr,
    /// MAC address, or `None` if the entry is incomplete
    pub hw_addr: Option<MacAddr>,
    /// Entry flags: `C` complete, `M` permanent
    pub flags: String,
    /// Interface on which the neighbor is reachable
    pub iface: String,
}

impl ArpEntry {
    /// Parse the output of `arp -n`.
    pub fn from_table(table: &str) -> Result<Vec<Self>, ParseError> {
        // an empty neighbor table is printed without header.
        if table.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_table(
            table,
            ["Address", "HWtype", "HWaddress", "Flags Mask", "Iface"],
        )?
        .into_iter()
        .map(|[address, hw_type, hw_addr, flags, iface]| -> Result<Self, ParseError> {
            // incomplete entries are not aligned to the columns.
            let incomplete = hw_type.contains("incomplete") || hw_addr.contains("incomplete");
            let hw_addr = if incomplete || hw_addr.is_empty() {
                None
            } else {
                Some(hw_addr.parse()?)
            };
            Ok(Self {
                address: address.parse()?,
                hw_addr,
                flags: flags.to_string(),
                iface: iface.to_string(),
            })
        })
        .collect()
    }

    /// Returns `true` if the entry was added manually as `nud permanent` (flag `M`).
    pub fn is_permanent(&self) -> bool {
        self.flags.contains('M')
    }
}
