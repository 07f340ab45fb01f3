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

//! Remove everything a previous lab left behind.

use crate::{config::CONFIG, netns::NetnsSession, LabCommand, LabError, LabLock, LockContent};

/// Generate the commands that remove all resources listed in the lock file: bridges first, then
/// root-namespace interfaces, and finally the namespaces.
pub fn cleanup_plan(content: &LockContent) -> Vec<LabCommand> {
    let ip = CONFIG.tools.ip.as_str();
    let vsctl = CONFIG.tools.ovs_vsctl.as_str();
    content
        .bridges
        .iter()
        .map(|b| LabCommand::root([vsctl, "--if-exists", "del-br", b.as_str()]))
        .chain(
            content
                .root_ifaces
                .iter()
                .map(|i| LabCommand::root([ip, "link", "del", i.as_str()])),
        )
        .chain(
            content
                .namespaces
                .iter()
                .map(|ns| LabCommand::root([ip, "netns", "del", ns.as_str()])),
        )
        .collect()
}

/// Parse the output of `ip netns list` and return all namespaces that start with `prefix`.
pub fn prefixed_namespaces(list: &str, prefix: &str) -> Vec<String> {
    list.lines()
        // newer versions append ` (id: N)`
        .filter_map(|l| l.split_whitespace().next())
        .filter(|ns| ns.starts_with(prefix))
        .map(String::from)
        .collect()
}

/// Reset the system to a clean state. The resources listed in the lock file are removed, then any
/// namespace that starts with the configured prefix, and finally the lock file itself. All
/// removals are best effort.
///
/// Returns the number of resources that were removed.
pub async fn cleanup() -> Result<usize, LabError> {
    let root = NetnsSession::root();
    let mut removed = 0;

    match LabLock::read(&CONFIG.lab.lock_file)? {
        Some(content) => {
            log::info!(
                "*** Removing the lab of {} (pid {})",
                content.user,
                content.pid
            );
            for cmd in cleanup_plan(&content) {
                match root.execute_cmd(&cmd.args).await {
                    Ok(_) => removed += 1,
                    Err(e) => log::debug!("[{}] {cmd} failed: {e}", root.name()),
                }
            }
        }
        None => log::info!("*** No lock file found at {}", CONFIG.lab.lock_file),
    }

    log::info!(
        "*** Removing leftover namespaces with prefix {}",
        CONFIG.lab.namespace_prefix
    );
    let list = root
        .execute_cmd_stdout(&[CONFIG.tools.ip.as_str(), "netns", "list"])
        .await?;
    for ns in prefixed_namespaces(&list, &CONFIG.lab.namespace_prefix) {
        match root
            .execute_cmd(&[CONFIG.tools.ip.as_str(), "netns", "del", ns.as_str()])
            .await
        {
            Ok(_) => {
                log::info!("[{}] removed namespace {ns}", root.name());
                removed += 1;
            }
            Err(e) => log::warn!("[{}] cannot remove namespace {ns}: {e}", root.name()),
        }
    }

    match std::fs::remove_file(&CONFIG.lab.lock_file) {
        Ok(()) => log::info!("*** Removed the lock file {}", CONFIG.lab.lock_file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    log::info!("*** Cleanup complete, {removed} resources removed");
    Ok(removed)
}
