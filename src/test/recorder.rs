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

use crate::recorder::{ResultRecorder, RULE_WIDTH};

#[test]
fn layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = ResultRecorder::create(dir.path().join("result.txt")).unwrap();
    rec.header("Title").unwrap();
    rec.block("Block:", "output").unwrap();
    rec.banner("Banner").unwrap();
    rec.entry("entry:", "more output\n").unwrap();

    let dashes = "-".repeat(RULE_WIDTH);
    let equals = "=".repeat(RULE_WIDTH);
    assert_eq!(
        rec.contents().unwrap(),
        format!(
            "Title\n{equals}\n\n\
             Block:\n{dashes}\noutput\n\
             \n{equals}\nBanner\n{equals}\n\n\
             entry:\nmore output\n\n"
        )
    );
    assert_eq!(rec.blocks(), 2);
}

#[test]
fn truncates_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.txt");
    std::fs::write(&path, "a much longer content of a previous run\n").unwrap();

    let mut rec = ResultRecorder::create(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    rec.write("new\n").unwrap();
    // every write is visible immediately
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    assert_eq!(rec.path(), path);
}

#[test]
fn missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ResultRecorder::create(dir.path().join("missing").join("result.txt")).is_err());
}
