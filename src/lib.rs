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

//! # NetLab: Two scripted network experiments
//!
//! This crate runs two small experiments on a network that is emulated with
//! [`netns_lab`] (network namespaces, veth pairs and Open vSwitch bridges):
//!
//! - [`experiment::routing`] (binary `exp1`): IPv4 routing between four subnets through two Linux
//!   routers with static routes. The result of four pings, the routing tables of both routers
//!   and the ARP tables of all nodes are written to `result1.txt`.
//! - [`experiment::l2`] (binary `exp2`): Two OVS switches in standalone mode. The connectivity is
//!   recorded before and after installing OpenFlow rules on `s1` that isolate `h2` from `h3`.
//!   The results are written to `result2.txt`.
//!
//! Both binaries drop into an interactive shell ([`netns_lab::cli`]) after the experiment, and tear
//! down the network when the shell exits. If a run is interrupted, `netlab-clean` removes
//! everything that was left behind.
//!
//! ## Structure
//! - The module [`experiment`] contains both experiments, and [`experiment::Probe`] which they use
//!   for the connectivity checks.
//! - The module [`recorder`] writes the result files.

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]

pub mod experiment;
pub mod recorder;

#[cfg(test)]
mod test;

pub use experiment::ExperimentError;
pub use recorder::ResultRecorder;

/// Initialize the logger. Messages of level `info` and above are printed, unless `RUST_LOG` says
/// otherwise.
pub fn init_logging() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init_timed();
}
