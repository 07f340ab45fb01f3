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

use itertools::Itertools;
use pretty_assertions::assert_eq;

use crate::{
    cleanup::{cleanup_plan, prefixed_namespaces},
    LockContent,
};

#[test]
fn plan_from_lock() {
    let content = LockContent {
        user: String::from("alice"),
        pid: 42,
        namespaces: vec![String::from("nl-h1"), String::from("nl-h2")],
        bridges: vec![String::from("s1")],
        root_ifaces: vec![String::from("s1-eth1"), String::from("s1-eth2")],
    };
    assert_eq!(
        cleanup_plan(&content).iter().join("\n"),
        "\
ovs-vsctl --if-exists del-br s1
ip link del s1-eth1
ip link del s1-eth2
ip netns del nl-h1
ip netns del nl-h2"
    );
}

#[test]
fn leftover_namespaces() {
    let list = "\
nl-h3 (id: 2)
docker-abc
nl-r1 (id: 0)
nl-h1
";
    assert_eq!(prefixed_namespaces(list, "nl-"), vec!["nl-h3", "nl-r1", "nl-h1"]);
    assert_eq!(prefixed_namespaces("", "nl-"), Vec::<String>::new());
}
