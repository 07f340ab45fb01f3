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

//! Interactive shell to inspect a running lab.
//!
//! The shell reads one command per line until `exit`, `quit`, or the end of the input:
//!
//! - `help`: print the available commands
//! - `nodes`: list all nodes
//! - `links` (or `net`): list the interfaces of each node together with their peers
//! - `pingall`: ping between all pairs of hosts
//! - `<node> <cmd>`: execute a shell command on a node, e.g., `h1 ip addr`. Arguments that name
//!   a node with an address are replaced by that address, so `h1 ping -c 1 h3` works.

use itertools::Itertools;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{config::CONFIG, topology::Topology, LabError, NodeExec};

/// Prompt printed before each command.
pub const PROMPT: &str = "netlab> ";

const HELP: &str = "\
Documented commands:
  help          print this message
  nodes         list all nodes
  links, net    list all interfaces and their peers
  pingall       ping between all pairs of hosts
  <node> <cmd>  execute <cmd> on <node>, e.g., `h1 ping -c 1 h2`
  exit, quit    leave the shell
";

/// Run the interactive shell, reading commands from `input` and writing to `output`.
pub async fn run_cli<E, R, W>(
    exec: &E,
    topo: &Topology,
    input: R,
    mut output: W,
) -> Result<(), LabError>
where
    E: NodeExec + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            break;
        };
        let line = line.trim();
        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((line, ""));

        let response = match command {
            "" => continue,
            "exit" | "quit" => break,
            "help" => HELP.to_string(),
            "nodes" => format!(
                "available nodes are: \n{}\n",
                topo.nodes().iter().map(|n| &n.name).join(" ")
            ),
            "links" | "net" => net(topo),
            "pingall" => pingall(exec, topo).await?,
            node if topo.node(node).is_some() => {
                if rest.is_empty() {
                    format!("*** Enter a command for node: {node} <cmd>\n")
                } else {
                    let rest = substitute_nodes(topo, rest);
                    match exec.cmd(node, &rest).await {
                        Ok(out) => out,
                        Err(e) => {
                            log::warn!("[{node}] {rest} failed: {e}");
                            format!("*** Error: {e}\n")
                        }
                    }
                }
            }
            _ => format!("*** Unknown command: {line}\n"),
        };
        output.write_all(response.as_bytes()).await?;
    }
    output.flush().await?;
    Ok(())
}

/// Replace every word of `line` that names a node by the address of that node. Nodes without an
/// address (e.g., switches) are kept as they are.
pub fn substitute_nodes(topo: &Topology, line: &str) -> String {
    line.split_whitespace()
        .map(|word| match topo.node(word).and_then(|n| n.default_addr()) {
            Some(addr) => addr.to_string(),
            None => word.to_string(),
        })
        .join(" ")
}

/// List each node with its interfaces and the peer of each interface, e.g.,
/// `h1 h1-eth0:s1-eth1`.
pub fn net(topo: &Topology) -> String {
    let mut result = String::new();
    for node in topo.nodes() {
        result.push_str(&node.name);
        for iface in node.ifaces.iter() {
            let peer = topo.links().iter().find_map(|l| {
                if l.0.node == node.name && l.0.iface == iface.name {
                    Some(&l.1.iface)
                } else if l.1.node == node.name && l.1.iface == iface.name {
                    Some(&l.0.iface)
                } else {
                    None
                }
            });
            match peer {
                Some(peer) => result.push_str(&format!(" {}:{}", iface.name, peer)),
                None => result.push_str(&format!(" {}:", iface.name)),
            }
        }
        result.push('\n');
    }
    result
}

/// Ping from every host to every other host with an address, and print the reachability matrix.
pub async fn pingall<E>(exec: &E, topo: &Topology) -> Result<String, LabError>
where
    E: NodeExec + ?Sized,
{
    let hosts: Vec<_> = topo
        .hosts()
        .filter_map(|h| h.default_addr().map(|a| (h.name.as_str(), a)))
        .collect();

    let mut result = String::from("*** Ping: testing ping reachability\n");
    let mut sent = 0;
    let mut received = 0;
    for (src, _) in hosts.iter() {
        result.push_str(&format!("{src} ->"));
        for (dst, addr) in hosts.iter().filter(|(dst, _)| dst != src) {
            let probe = exec.ping(src, *addr, CONFIG.probe.count).await?;
            sent += 1;
            if probe.is_success() {
                received += 1;
                result.push_str(&format!(" {dst}"));
            } else {
                result.push_str(" X");
            }
        }
        result.push('\n');
    }

    let dropped = if sent == 0 {
        0
    } else {
        100 * (sent - received) / sent
    };
    result.push_str(&format!(
        "*** Results: {dropped}% dropped ({received}/{sent} received)\n"
    ));
    Ok(result)
}
