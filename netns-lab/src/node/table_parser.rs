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

//! Module for parsing column-aligned tables, as printed by `route -n` or `arp -n`.

use itertools::Itertools;
use thiserror::Error;

pub struct Assert<const N: usize>;
impl<const N: usize> Assert<N> {
    pub const NON_ZERO: usize = N - 1;
}

/// Parse a table using the given header field names. All lines before the header are skipped
/// (e.g., `Kernel IP routing table`). The columns are determined by the position of the header
/// names, so empty cells are supported. It returns an array of trimmed cells for each non-empty
/// line after the header.
pub fn parse_table<'a, const N: usize>(
    table: &'a str,
    headers: [&'static str; N],
) -> Result<Vec<[&'a str; N]>, TableParseError> {
    _ = Assert::<N>::NON_ZERO;

    let expected = headers.iter().join(" ");
    let mut lines = table.lines();
    let header = lines
        .find(|l| l.split_whitespace().join(" ") == expected)
        .ok_or_else(|| {
            TableParseError::InvalidHeader(table.lines().next().unwrap_or_default().to_string())
        })?;

    // all headers are present, as checked above.
    let mut positions = [0; N];
    let mut offset = 0;
    for (pos, h) in positions.iter_mut().zip(headers) {
        let found = header[offset..]
            .find(h)
            .ok_or_else(|| TableParseError::InvalidHeader(header.to_string()))?;
        *pos = offset + found;
        offset = *pos + h.len();
    }

    let mut results = Vec::new();
    for row in lines {
        if row.trim().is_empty() {
            continue;
        }
        if row.len() <= positions[N - 1] {
            return Err(TableParseError::RowTooShort(row.to_string()));
        }
        let mut idx = 0;
        let cells = positions.map(|low| {
            let high = positions.get(idx + 1).copied().unwrap_or(row.len());
            idx += 1;
            row.get(low..high).unwrap_or("").trim()
        });
        results.push(cells)
    }

    Ok(results)
}

/// Error while parsing a table
#[derive(Debug, Error)]
pub enum TableParseError {
    /// Invalid header line.
    #[error("Invalid header line: {0}")]
    InvalidHeader(String),
    /// Row is too short
    #[error("A row is too short to be parsed: {0}")]
    RowTooShort(String),
}
