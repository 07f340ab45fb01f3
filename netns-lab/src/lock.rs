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

//! The lock file that makes sure only a single lab is active at any time.
//!
//! The lock file contains the user that owns the lab, together with every namespace, bridge and
//! root-namespace interface the lab creates. If the lab is not torn down properly, the lock stays
//! in place, and [`crate::cleanup`] uses its content to remove the remaining resources.

use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::LabError;

/// Content of the lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockContent {
    /// User that created the lock
    pub user: String,
    /// Process that created the lock
    pub pid: u32,
    /// Network namespaces created by the lab
    pub namespaces: Vec<String>,
    /// OVS bridges created by the lab
    pub bridges: Vec<String>,
    /// Interfaces created in the root namespace
    pub root_ifaces: Vec<String>,
}

impl LockContent {
    /// Create the content for the current user and process, without any resources.
    pub fn current() -> Self {
        Self {
            user: std::env::var("SUDO_USER")
                .or_else(|_| std::env::var("USER"))
                .unwrap_or_else(|_| String::from("unknown")),
            pid: std::process::id(),
            ..Default::default()
        }
    }
}

/// An obtained lock. The lock file is only removed by calling [`LabLock::release`]. Dropping the
/// lock keeps the file, so that the remaining resources can be cleaned up later.
#[derive(Debug)]
pub struct LabLock {
    path: PathBuf,
    content: LockContent,
    released: bool,
}

impl LabLock {
    /// Try to obtain the lock by creating the file at `path`. If the file already exists, this
    /// function returns [`LabError::CannotObtainLock`] with the user that owns the lock.
    pub fn obtain(path: impl AsRef<Path>, content: LockContent) -> Result<Self, LabError> {
        let path = path.as_ref().to_path_buf();
        log::trace!("Obtaining the lock {}", path.display());

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let user = Self::read(&path)
                    .ok()
                    .flatten()
                    .map(|c| c.user)
                    .unwrap_or_else(|| String::from("unknown"));
                log::error!(
                    "Cannot obtain the lock! User {user} is already running a lab! Run \
                     `netlab-clean` if this is a leftover."
                );
                return Err(LabError::CannotObtainLock(user));
            }
            Err(e) => Err(e)?,
        };
        file.write_all(serde_json::to_string_pretty(&content)?.as_bytes())?;

        Ok(Self {
            path,
            content,
            released: false,
        })
    }

    /// Read the content of an existing lock file. Returns `None` if the file does not exist.
    pub fn read(path: impl AsRef<Path>) -> Result<Option<LockContent>, LabError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The content written into the lock file.
    pub fn content(&self) -> &LockContent {
        &self.content
    }

    /// The path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file.
    pub fn release(mut self) -> Result<(), LabError> {
        log::debug!("Releasing lock {}", self.path.display());
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LabLock {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "Keeping the lock {}! Run `netlab-clean` to remove leftover resources.",
                self.path.display()
            );
        }
    }
}
