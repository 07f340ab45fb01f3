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

//! This library emulates small networks on a single Linux machine, using network namespaces,
//! veth pairs and Open vSwitch bridges.
//!
//! # Requirements
//!
//! All commands need root privileges. Either run the program as root, or set `lab.use_sudo = true`
//! in the configuration and make sure that `sudo` does not ask for a password. The following
//! programs must be installed: `ip` (iproute2), `ovs-vsctl` and `ovs-ofctl` (Open vSwitch, with a
//! running `ovs-vswitchd`), and inside the namespaces `ping`, `sysctl`, `route` and `arp`.
//!
//! # Configuration
//!
//! The configuration is read from `$NETNS_LAB_CONFIG/config.toml`. If the variable is not set,
//! the defaults are used. See [`config::Config`] for all options:
//!
//! ```toml
//! [lab]
//! namespace_prefix = "nl-"
//! lock_file = "/tmp/netns-lab.lock"
//! use_sudo = false
//!
//! [tools]
//! ip = "ip"
//! ovs_vsctl = "ovs-vsctl"
//! ovs_ofctl = "ovs-ofctl"
//! shell = "sh"
//!
//! [probe]
//! count = 1
//! ```
//!
//! # Locking Mechanism
//!
//! Only a single lab can be active on a machine. The main structure [`Lab`] contains a type
//! parameter `S` which is either [`Inactive`] or [`Active`]. In `Inactive` state, you can only
//! generate the commands that would build the network. In `Active` state, the network is running
//! and commands can be executed on each node.
//!
//! To enforce that only a single instance is active, [`Lab::connect`] creates a lock file (by
//! default `/tmp/netns-lab.lock`). The lock file contains the user and all resources that were
//! created. [`Lab::disconnect`] removes the network and releases the lock. If anything goes wrong
//! during the teardown, the lock is kept, and [`cleanup`] removes what is left.
//!
//! # Nodes
//!
//! - **Hosts** and **routers** live in their own network namespace, named
//!   `<namespace_prefix><node>`. Routers have IPv4 forwarding enabled while the lab is active.
//! - **Switches** are OVS bridges in the root namespace, with fail-mode `standalone` (a learning
//!   switch without controller) or `secure`. The switch-side interface `<switch>-ethN` is attached
//!   as OpenFlow port `N`.
//!
//! Commands on nodes are executed through the [`NodeExec`] trait, which is implemented by
//! `Lab<Active>`.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

use std::{collections::BTreeMap, fmt};

use itertools::Itertools;
use thiserror::Error;

pub mod cleanup;
pub mod cli;
pub mod config;
mod lock;
pub mod netns;
pub mod node;
pub mod probe;
pub mod switch;
pub mod topology;

#[cfg(test)]
mod test;

pub use cleanup::cleanup;
pub use lock::{LabLock, LockContent};
pub use node::{NodeExec, ParseError};
pub use probe::{PingSummary, ProbeResult};
pub use switch::{FlowAction, FlowRule};

use config::CONFIG;
use netns::{NetnsError, NetnsSession};
use topology::{Topology, TopologyError};

/// The `Lab` is in offline mode. It does not touch the system, but you can still generate the
/// commands to build the network.
#[derive(Debug)]
pub struct Inactive;

/// The `Lab` is instantiated on the system. The structure contains the lock and a session for
/// each node.
#[derive(Debug)]
pub struct Active {
    pub(crate) lock: LabLock,
    pub(crate) sessions: BTreeMap<String, NetnsSession>,
}

/// An emulated network. The type parameter `S` indicates the state: either [`Inactive`] or
/// [`Active`]. There can be at most one `Lab<Active>` on a machine, which is enforced by the lock
/// file.
///
/// ```rust,no_run
/// use netns_lab::{topology::{LinkSpec, Node, Topology}, Lab, NodeExec};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut topo = Topology::new();
/// topo.add_node(Node::host("h1").with_ip("10.0.0.1/24".parse()?));
/// topo.add_node(Node::host("h2").with_ip("10.0.0.2/24".parse()?));
/// topo.add_link(LinkSpec::new("h1", "h2"))?;
///
/// let lab = Lab::new(topo)?.connect().await?;
/// let result = lab.ping("h1", "10.0.0.2".parse()?, 1).await?;
/// println!("{}", result.output);
/// lab.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Lab<S = Inactive> {
    topo: Topology,
    state: S,
}

impl Lab<Inactive> {
    /// Create a new instance from the topology. The topology is validated, but nothing is changed
    /// on the system.
    pub fn new(topo: Topology) -> Result<Self, LabError> {
        topo.validate()?;
        Ok(Self {
            topo,
            state: Inactive,
        })
    }

    /// Build the network. This creates the lock file, and then executes all commands of
    /// [`Lab::generate_setup_plan`] in order. If any command fails, everything that was created so
    /// far is removed again (best effort), and the error is returned.
    pub async fn connect(self) -> Result<Lab<Active>, LabError> {
        let plan = self.generate_setup_plan();
        let lock = LabLock::obtain(&CONFIG.lab.lock_file, self.lock_content())?;

        let sessions = self
            .topo
            .nodes()
            .iter()
            .map(|n| {
                let session = match n.namespace() {
                    Some(ns) => NetnsSession::new(ns),
                    None => NetnsSession::root(),
                };
                (n.name.clone(), session)
            })
            .collect();

        let lab = Lab {
            topo: self.topo,
            state: Active { lock, sessions },
        };

        log::info!("*** Creating network");
        let result = lab.setup(&plan).await;
        if let Err(e) = result {
            log::error!("Cannot create the network: {e}");
            let _ = lab.disconnect().await;
            return Err(e);
        }

        log::info!(
            "*** Network started: {} nodes, {} links",
            lab.topo.nodes().len(),
            lab.topo.links().len()
        );
        Ok(lab)
    }

    /// The resources that will be written into the lock file.
    fn lock_content(&self) -> LockContent {
        LockContent {
            namespaces: self.topo.nodes().iter().filter_map(|n| n.namespace()).collect(),
            bridges: self.topo.switches().map(|s| s.name.clone()).collect(),
            root_ifaces: self.root_ifaces().map(|e| e.iface.clone()).collect(),
            ..LockContent::current()
        }
    }
}

impl Lab<Active> {
    /// Execute the setup plan and make sure all namespaces are usable.
    async fn setup(&self, plan: &[LabCommand]) -> Result<(), LabError> {
        self.execute_plan(plan).await?;
        for n in self.topo.nodes().iter().filter(|n| n.has_namespace()) {
            self.session(&n.name)?.verify().await?;
        }
        Ok(())
    }

    /// Execute all commands in order. Stops at the first command that fails.
    async fn execute_plan(&self, plan: &[LabCommand]) -> Result<(), LabError> {
        for cmd in plan {
            cmd.session().execute_cmd(&cmd.args).await?;
        }
        Ok(())
    }

    /// Remove the network. All commands of [`Lab::generate_teardown_plan`] are executed, even if
    /// some of them fail. If all succeed, the lock is released. Otherwise, the lock is kept and
    /// [`LabError::Teardown`] is returned. Use [`cleanup`] to reset the state in that case.
    pub async fn disconnect(self) -> Result<Lab<Inactive>, LabError> {
        log::info!("*** Stopping network");
        let mut failures = 0;
        for cmd in self.generate_teardown_plan() {
            if let Err(e) = cmd.session().execute_cmd(&cmd.args).await {
                log::warn!("[{}] teardown step failed: {e}", cmd.session().name());
                failures += 1;
            }
        }

        if failures > 0 {
            // dropping the lock keeps the file.
            return Err(LabError::Teardown(failures));
        }

        self.state.lock.release()?;
        log::info!("*** Network stopped");
        Ok(Lab {
            topo: self.topo,
            state: Inactive,
        })
    }

    /// Get the session of a node.
    pub fn session(&self, node: &str) -> Result<&NetnsSession, LabError> {
        self.state
            .sessions
            .get(node)
            .ok_or_else(|| TopologyError::NodeNotFound(node.to_string()).into())
    }
}

impl<S> Lab<S> {
    /// Get the topology.
    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// Generate all commands that create the network, in the order they must be executed:
    ///
    /// 1. namespaces for hosts and routers (and their loopback interface),
    /// 2. OVS bridges for switches,
    /// 3. veth pairs, moved into the namespaces, addressed, and attached to bridges,
    /// 4. default routes on hosts and IP forwarding on routers.
    pub fn generate_setup_plan(&self) -> Vec<LabCommand> {
        let mut plan = self.plan_namespaces();
        plan.extend(self.plan_bridges());
        plan.extend(self.plan_links());
        plan.extend(self.plan_node_config());
        plan
    }

    /// Generate all commands that remove the network.
    pub fn generate_teardown_plan(&self) -> Vec<LabCommand> {
        let mut plan = self.plan_node_teardown();
        plan.extend(self.plan_switch_teardown());
        plan.extend(self.plan_namespace_teardown());
        plan
    }
}

/// A single command of a setup or teardown plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabCommand {
    /// Namespace in which the command is executed (`None` for the root namespace).
    pub netns: Option<String>,
    /// The program followed by its arguments.
    pub args: Vec<String>,
}

impl LabCommand {
    /// Create a command that runs in the root namespace.
    pub fn root<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            netns: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a command that runs in the namespace `ns`.
    pub fn netns<I, A>(ns: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            netns: Some(ns.into()),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a command that runs in `ns`, or in the root namespace if `ns` is `None`.
    pub fn maybe_netns<I, A>(ns: Option<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        match ns {
            Some(ns) => Self::netns(ns, args),
            None => Self::root(args),
        }
    }

    fn session(&self) -> NetnsSession {
        match &self.netns {
            Some(ns) => NetnsSession::new(ns.clone()),
            None => NetnsSession::root(),
        }
    }
}

/// Formats the command as it would be typed in a root shell.
impl fmt::Display for LabCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.netns {
            write!(f, "{} netns exec {ns} ", CONFIG.tools.ip)?;
        }
        write!(f, "{}", self.args.iter().join(" "))
    }
}

/// Error type thrown while managing the lab.
#[derive(Debug, Error)]
pub enum LabError {
    /// Invalid topology
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    /// Error while executing a command
    #[error("{0}")]
    Netns(#[from] NetnsError),
    /// Cannot parse the output of a command
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// I/O Error
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Cannot read or write the lock file
    #[error("Lock file error: {0}")]
    Json(#[from] serde_json::Error),
    /// Cannot obtain the lock.
    #[error("Cannot obtain the lock! {0} owns the lock to the lab.")]
    CannotObtainLock(String),
    /// Some steps of the teardown failed. The lock was kept.
    #[error("{0} teardown steps failed! Run the cleanup to reset the system.")]
    Teardown(usize),
}
