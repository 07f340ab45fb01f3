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

//! This module contains the code for reading the configuration.
//!
//! The configuration is read from `$NETNS_LAB_CONFIG/config.toml`. If the environment variable is
//! not set (and always while running the unit tests), the built-in defaults are used. Every key is
//! optional; missing keys fall back to their default.

use lazy_static::lazy_static;
use serde::{Deserialize, Deserializer};

macro_rules! expect {
    ($result:expr, $($rest:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!("Error: {}: {}\n", format!($($rest)*), e);
            panic!()
        })
    };
}

lazy_static! {
    /// Directory containing `config.toml`, taken from `$NETNS_LAB_CONFIG`.
    pub static ref CONFIG_DIR: Option<String> = {
        if cfg!(test) {
            None
        } else {
            std::env::var("NETNS_LAB_CONFIG").ok()
        }
    };
    /// The parsed configuration.
    pub static ref CONFIG: Config = match CONFIG_DIR.as_ref() {
        Some(dir) => {
            let config_str = expect!(
                std::fs::read_to_string(format!("{dir}/config.toml")),
                "Cannot read '{}/config.toml'",
                dir
            );
            expect!(
                toml::from_str(&config_str),
                "Cannot parse '{}/config.toml'",
                dir
            )
        }
        None => Config::default(),
    };
}

/// Global configuration of the lab.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Section `[lab]`
    pub lab: LabConfig,
    /// Section `[tools]`
    pub tools: ToolsConfig,
    /// Section `[probe]`
    pub probe: ProbeConfig,
}

/// Configuration of the emulated network itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Prefix prepended to the node name to get the name of its network namespace. The cleanup
    /// removes every namespace that starts with this prefix.
    #[serde(deserialize_with = "deserialize_prefix")]
    pub namespace_prefix: String,
    /// Path of the lock file. It contains the user that owns the lab and all resources that were
    /// created.
    pub lock_file: String,
    /// Prepend `sudo` to every command. Make sure that `sudo` does not ask for a password.
    pub use_sudo: bool,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: String::from("nl-"),
            lock_file: String::from("/tmp/netns-lab.lock"),
            use_sudo: false,
        }
    }
}

/// Names (or paths) of the external programs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// The `ip` utility from iproute2
    pub ip: String,
    /// The Open vSwitch database client
    pub ovs_vsctl: String,
    /// The Open vSwitch OpenFlow client
    pub ovs_ofctl: String,
    /// The shell used to execute node commands (`<shell> -c <cmd>`).
    pub shell: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ip: String::from("ip"),
            ovs_vsctl: String::from("ovs-vsctl"),
            ovs_ofctl: String::from("ovs-ofctl"),
            shell: String::from("sh"),
        }
    }
}

/// Parameters of the connectivity checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Number of echo requests per probe.
    pub count: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { count: 1 }
    }
}

fn deserialize_prefix<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let x = String::deserialize(de)?;
    if x.is_empty() || x.contains(char::is_whitespace) || x.contains('/') {
        Err(serde::de::Error::custom(format!(
            "Invalid namespace prefix: {x:?}"
        )))
    } else {
        Ok(x)
    }
}
