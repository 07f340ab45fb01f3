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

//! Results of connectivity checks.

use std::{fmt, net::Ipv4Addr};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STATS_RE: Regex = Regex::new(
        r"(\d+) packets transmitted, (\d+) (?:packets )?received,(?:.*?)([0-9.]+)% packet loss"
    )
    .unwrap();
    static ref RTT_RE: Regex =
        Regex::new(r"(?:rtt|round-trip) min/avg/max(?:/mdev)? = [0-9.]+/([0-9.]+)/").unwrap();
}

/// The captured output of a single `ping` from `src` to `dst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Node that sent the echo requests
    pub src: String,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Everything `ping` printed, unchanged
    pub output: String,
}

impl ProbeResult {
    /// Parse the statistics line of the output. Returns `None` if `ping` did not print one (e.g.,
    /// when the network is unreachable).
    pub fn summary(&self) -> Option<PingSummary> {
        PingSummary::from_output(&self.output)
    }

    /// Returns `true` if at least one reply was received.
    pub fn is_success(&self) -> bool {
        self.summary().map(|s| s.received > 0).unwrap_or(false)
    }

    /// The packet loss in percent. A probe without statistics counts as 100% loss.
    pub fn loss_percent(&self) -> f64 {
        self.summary().map(|s| s.loss_percent).unwrap_or(100.0)
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// The statistics printed at the end of `ping`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSummary {
    /// Number of echo requests sent
    pub transmitted: u32,
    /// Number of echo replies received
    pub received: u32,
    /// Packet loss in percent
    pub loss_percent: f64,
    /// Average round-trip time, if any reply was received
    pub rtt_avg_ms: Option<f64>,
}

impl PingSummary {
    /// Extract the statistics from the output of `ping`.
    pub fn from_output(output: &str) -> Option<Self> {
        let stats = STATS_RE.captures(output)?;
        Some(Self {
            transmitted: stats[1].parse().ok()?,
            received: stats[2].parse().ok()?,
            loss_percent: stats[3].parse().ok()?,
            rtt_avg_ms: RTT_RE
                .captures(output)
                .and_then(|c| c[1].parse().ok()),
        })
    }
}
