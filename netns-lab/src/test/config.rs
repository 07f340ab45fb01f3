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

use crate::config::{Config, CONFIG, CONFIG_DIR};

#[test]
fn defaults_in_tests() {
    assert_eq!(*CONFIG_DIR, None);
    assert_eq!(CONFIG.lab.namespace_prefix, "nl-");
    assert_eq!(CONFIG.lab.lock_file, "/tmp/netns-lab.lock");
    assert!(!CONFIG.lab.use_sudo);
    assert_eq!(CONFIG.tools.ip, "ip");
    assert_eq!(CONFIG.probe.count, 1);
}

#[test]
fn partial_config() {
    let config: Config = toml::from_str(
        r#"
[lab]
namespace_prefix = "exp-"
use_sudo = true

[tools]
ovs_ofctl = "/usr/local/bin/ovs-ofctl"
"#,
    )
    .unwrap();
    assert_eq!(config.lab.namespace_prefix, "exp-");
    assert!(config.lab.use_sudo);
    assert_eq!(config.lab.lock_file, "/tmp/netns-lab.lock");
    assert_eq!(config.tools.ovs_ofctl, "/usr/local/bin/ovs-ofctl");
    assert_eq!(config.tools.ovs_vsctl, "ovs-vsctl");
    assert_eq!(config.probe.count, 1);
}

#[test]
fn invalid_prefix() {
    for prefix in ["", "a b", "a/b"] {
        let config = format!("[lab]\nnamespace_prefix = {prefix:?}\n");
        assert!(toml::from_str::<Config>(&config).is_err(), "{prefix:?}");
    }
}
