//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Atomically replaces the contents of `path` with `data`.
///
/// The data is first written to a temporary sibling file which is then
/// renamed over the destination. Readers observe either the old or the new
/// contents, never a partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let mut file = File::create(tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(tmp, path)
}
