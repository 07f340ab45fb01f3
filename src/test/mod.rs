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
use netns_lab::{
    topology::{MacAddr, Topology},
    LabError, NodeExec,
};

mod recorder;
mod routing;

/// Node executor that answers with canned outputs and records every command.
#[derive(Debug, Default)]
pub(crate) struct MockExec {
    responses: HashMap<(String, String), String>,
    /// Outputs that replace `responses` once a command containing the trigger was executed.
    changed: HashMap<(String, String), (String, String)>,
    log: Mutex<Vec<(String, String)>>,
}

impl MockExec {
    /// Create an executor with the outputs of `(node, command)` pairs.
    pub(crate) fn new(responses: HashMap<(&str, &str), &str>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|((n, c), o)| ((n.to_string(), c.to_string()), o.to_string()))
                .collect(),
            changed: Default::default(),
            log: Default::default(),
        }
    }

    /// Add the output of a single command.
    pub(crate) fn respond(mut self, node: &str, cmd: &str, output: &str) -> Self {
        self.responses
            .insert((node.to_string(), cmd.to_string()), output.to_string());
        self
    }

    /// Answer `cmd` on `node` with `output` as soon as any command containing `trigger` was
    /// executed, e.g., to let pings fail after `add-flow`.
    pub(crate) fn respond_after(
        mut self,
        trigger: &str,
        node: &str,
        cmd: &str,
        output: &str,
    ) -> Self {
        self.changed.insert(
            (node.to_string(), cmd.to_string()),
            (trigger.to_string(), output.to_string()),
        );
        self
    }

    /// Answer the MAC address query of every interface with a distinct address.
    pub(crate) fn with_macs(mut self, topo: &Topology) -> Self {
        let ifaces = topo
            .nodes()
            .iter()
            .flat_map(|n| n.ifaces.iter().map(move |i| (n.name.clone(), i.name.clone())));
        for (idx, (node, iface)) in ifaces.enumerate() {
            let mac = MacAddr::from_index(100 + idx as u64);
            self = self.respond(
                &node,
                &format!("cat /sys/class/net/{iface}/address"),
                &format!("{mac}\n"),
            );
        }
        self
    }

    /// All executed commands, in order.
    pub(crate) fn commands(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }

    /// All commands executed on `node`.
    pub(crate) fn commands_on(&self, node: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|(n, _)| n == node)
            .map(|(_, c)| c)
            .collect()
    }
}

#[async_trait]
impl NodeExec for MockExec {
    async fn cmd(&self, node: &str, cmd: &str) -> Result<String, LabError> {
        let key = (node.to_string(), cmd.to_string());
        let mut log = self.log.lock().unwrap();
        let changed = self
            .changed
            .get(&key)
            .filter(|(trigger, _)| log.iter().any(|(_, c)| c.contains(trigger.as_str())))
            .map(|(_, output)| output.clone());
        log.push(key.clone());
        Ok(changed
            .or_else(|| self.responses.get(&key).cloned())
            .unwrap_or_default())
    }
}
