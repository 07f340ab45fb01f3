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

//! Text file that collects the results of an experiment.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Width of the horizontal rules below titles.
pub const RULE_WIDTH: usize = 60;

/// Writes the results of an experiment into a file. The file is truncated when the recorder is
/// created, and every write is flushed immediately, so the file is complete even if the
/// experiment is aborted.
#[derive(Debug)]
pub struct ResultRecorder {
    path: PathBuf,
    file: File,
    blocks: usize,
}

impl ResultRecorder {
    /// Create (or overwrite) the result file.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        log::debug!("Writing results to {}", path.display());
        Ok(Self {
            path,
            file,
            blocks: 0,
        })
    }

    /// Write raw text.
    pub fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.file.write_all(text.as_bytes())?;
        self.file.flush()
    }

    /// Write a horizontal rule of [`RULE_WIDTH`] characters, followed by a newline.
    pub fn rule(&mut self, c: char) -> std::io::Result<()> {
        let mut line: String = std::iter::repeat(c).take(RULE_WIDTH).collect();
        line.push('\n');
        self.write(&line)
    }

    /// Write the title of the file, underlined with `=`, followed by an empty line.
    pub fn header(&mut self, title: &str) -> std::io::Result<()> {
        self.write(&format!("{title}\n"))?;
        self.rule('=')?;
        self.write("\n")
    }

    /// Write a section title that is framed by two lines of `=`.
    pub fn banner(&mut self, title: &str) -> std::io::Result<()> {
        self.write("\n")?;
        self.rule('=')?;
        self.write(&format!("{title}\n"))?;
        self.rule('=')?;
        self.write("\n")
    }

    /// Write a title underlined with `-`.
    pub fn section(&mut self, title: &str) -> std::io::Result<()> {
        self.write(&format!("{title}\n"))?;
        self.rule('-')
    }

    /// Write a captured command output below a title underlined with `-`.
    pub fn block(&mut self, title: &str, output: &str) -> std::io::Result<()> {
        self.section(title)?;
        self.capture(output)
    }

    /// Write a captured command output below a plain label.
    pub fn entry(&mut self, label: &str, output: &str) -> std::io::Result<()> {
        self.write(&format!("{label}\n"))?;
        self.capture(output)
    }

    /// Write a captured command output followed by a newline.
    pub fn capture(&mut self, output: &str) -> std::io::Result<()> {
        self.blocks += 1;
        self.write(&format!("{output}\n"))
    }

    /// Number of captured outputs written so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Path of the result file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back everything that was written.
    pub fn contents(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}
