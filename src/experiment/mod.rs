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

//! The two experiments, and the parts they share.
//!
//! Both experiments only talk to the network through [`NodeExec`], so they can be executed on a
//! running [`netns_lab::Lab`] as well as on a scripted executor in the tests.

use std::net::Ipv4Addr;

use netns_lab::{
    topology::{Topology, TopologyError},
    LabError, NodeExec, ProbeResult,
};
use thiserror::Error;

pub mod l2;
pub mod routing;

/// A single connectivity check from one node to the address of another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Node that sends the echo requests
    pub src: String,
    /// Address of the source node
    pub src_addr: Ipv4Addr,
    /// Node that should answer
    pub dst: String,
    /// Address of the destination node
    pub dst_addr: Ipv4Addr,
}

impl Probe {
    /// Look up the addresses of both nodes in the topology.
    pub fn new(topo: &Topology, src: &str, dst: &str) -> Result<Self, ExperimentError> {
        let addr = |name: &str| {
            topo.node(name)
                .and_then(|n| n.default_addr())
                .ok_or_else(|| ExperimentError::NoAddress(name.to_string()))
        };
        Ok(Self {
            src: src.to_string(),
            src_addr: addr(src)?,
            dst: dst.to_string(),
            dst_addr: addr(dst)?,
        })
    }

    /// Ping once from the source to the destination. A failed ping is a valid result.
    pub async fn run<E>(&self, exec: &E) -> Result<ProbeResult, ExperimentError>
    where
        E: NodeExec + ?Sized,
    {
        let result = exec.ping(&self.src, self.dst_addr, 1).await?;
        match result.summary() {
            Some(s) => log::info!(
                "{} -> {}: {}/{} received",
                self.src,
                self.dst,
                s.received,
                s.transmitted
            ),
            None => log::warn!("{} -> {}: no ping statistics", self.src, self.dst),
        }
        Ok(result)
    }
}

/// Create all probes from a list of node pairs.
pub fn probes(topo: &Topology, pairs: &[(&str, &str)]) -> Result<Vec<Probe>, ExperimentError> {
    pairs
        .iter()
        .map(|(src, dst)| Probe::new(topo, src, dst))
        .collect()
}

/// Error while running an experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Error of the emulated network
    #[error("{0}")]
    Lab(#[from] LabError),
    /// Invalid topology
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    /// Cannot parse an address
    #[error("Cannot parse IP network: {0}")]
    IpNetParse(#[from] ipnet::AddrParseError),
    /// Cannot write the results
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// A node that should be probed has no address
    #[error("Node {0} has no address")]
    NoAddress(String),
    /// A node that is used by the experiment is missing
    #[error("Node {0} is missing in the topology")]
    MissingNode(String),
}
