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

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    topology::{LinkSpec, Node, Topology},
    LabError, NodeExec,
};

mod cleanup;
mod config;
mod tables;

/// Node executor that answers with canned outputs and records every command.
#[derive(Debug, Default)]
pub(crate) struct MockExec {
    responses: HashMap<(String, String), String>,
    pub(crate) log: Mutex<Vec<(String, String)>>,
}

impl MockExec {
    pub(crate) fn respond(mut self, node: &str, cmd: &str, output: &str) -> Self {
        self.responses
            .insert((node.to_string(), cmd.to_string()), output.to_string());
        self
    }

    pub(crate) fn commands(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeExec for MockExec {
    async fn cmd(&self, node: &str, cmd: &str) -> Result<String, LabError> {
        self.log
            .lock()
            .unwrap()
            .push((node.to_string(), cmd.to_string()));
        Ok(self
            .responses
            .get(&(node.to_string(), cmd.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// `h1 -- s1 -- s2 -- h3` with `h2` on `s1`.
pub(crate) fn l2_topo() -> Topology {
    let mut topo = Topology::new();
    topo.auto_set_macs();
    topo.add_node(Node::switch("s1"));
    topo.add_node(Node::switch("s2"));
    topo.add_node(Node::host("h1").with_ip("10.0.0.1/24".parse().unwrap()));
    topo.add_node(Node::host("h2").with_ip("10.0.0.2/24".parse().unwrap()));
    topo.add_node(Node::host("h3").with_ip("10.0.0.3/24".parse().unwrap()));
    topo.add_link(LinkSpec::new("h1", "s1")).unwrap();
    topo.add_link(LinkSpec::new("h2", "s1")).unwrap();
    topo.add_link(LinkSpec::new("s1", "s2")).unwrap();
    topo.add_link(LinkSpec::new("s2", "h3")).unwrap();
    topo
}

/// `h1 -- r1 -- r2 -- h3` with `h2` on `r1`.
pub(crate) fn routed_topo() -> Topology {
    let mut topo = Topology::new();
    topo.add_node(
        Node::host("h1")
            .with_ip("10.0.0.3/24".parse().unwrap())
            .with_default_route("10.0.0.1".parse().unwrap()),
    );
    topo.add_node(
        Node::host("h2")
            .with_ip("10.0.3.2/24".parse().unwrap())
            .with_default_route("10.0.3.4".parse().unwrap()),
    );
    topo.add_node(
        Node::host("h3")
            .with_ip("10.0.2.2/24".parse().unwrap())
            .with_default_route("10.0.2.1".parse().unwrap()),
    );
    topo.add_node(Node::router("r1"));
    topo.add_node(Node::router("r2"));
    topo.add_link(
        LinkSpec::new("h1", "r1")
            .iface_names("h1-eth0", "r1-eth0")
            .ips("10.0.0.3/24".parse().unwrap(), "10.0.0.1/24".parse().unwrap()),
    )
    .unwrap();
    topo.add_link(
        LinkSpec::new("r1", "r2")
            .iface_names("r1-eth1", "r2-eth0")
            .ips("10.0.1.1/24".parse().unwrap(), "10.0.1.2/24".parse().unwrap()),
    )
    .unwrap();
    topo.add_link(
        LinkSpec::new("r2", "h3")
            .iface_names("r2-eth1", "h3-eth0")
            .ips("10.0.2.1/24".parse().unwrap(), "10.0.2.2/24".parse().unwrap()),
    )
    .unwrap();
    topo.add_link(
        LinkSpec::new("h2", "r1")
            .iface_names("h2-eth0", "r1-eth2")
            .ips("10.0.3.2/24".parse().unwrap(), "10.0.3.4/24".parse().unwrap()),
    )
    .unwrap();
    topo
}
