// RPLA: Generation and Execution of RPL Attack Experiments on Simulated Sensor Networks
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Temporary replacement of Contiki's RPL library by an external one.
//!
//! The replacement mutates the Contiki checkout in place: only one experiment may be made at a
//! time per checkout.

use std::{
    io,
    path::{Path, PathBuf},
};

use rpla_utils::fs_utils::{copy_folder, move_folder, remove_folder};

/// An installed external RPL library. The original library is put back by [`RplSwap::restore`],
/// or when the swap is dropped.
#[derive(Debug)]
pub struct RplSwap {
    rpl_folder: PathBuf,
    backup_folder: PathBuf,
    restored: bool,
}

impl RplSwap {
    /// Move the library at `rpl_folder` to `<backup_root>/rpl` and copy `ext_lib` in its place.
    pub fn install(rpl_folder: &Path, ext_lib: &Path, backup_root: &Path) -> io::Result<Self> {
        let backup_folder = backup_root.join("rpl");
        log::debug!(" > Replacing {rpl_folder:?} by {ext_lib:?}");
        move_folder(rpl_folder, &backup_folder)?;
        let swap = Self {
            rpl_folder: rpl_folder.to_path_buf(),
            backup_folder,
            restored: false,
        };
        // on failure, dropping `swap` puts the original back
        copy_folder(ext_lib, rpl_folder)?;
        Ok(swap)
    }

    /// Put the original library back and remove the backup folder.
    pub fn restore(mut self) -> io::Result<()> {
        self.restore_original()
    }

    fn restore_original(&mut self) -> io::Result<()> {
        self.restored = true;
        log::debug!(" > Restoring the original RPL library at {:?}", self.rpl_folder);
        remove_folder(&self.rpl_folder)?;
        move_folder(&self.backup_folder, &self.rpl_folder)?;
        if let Some(backup_root) = self.backup_folder.parent() {
            remove_folder(backup_root)?;
        }
        Ok(())
    }
}

impl Drop for RplSwap {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.restore_original() {
            log::error!(
                "Cannot restore the original RPL library from {:?}: {e}",
                self.backup_folder
            );
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rpla_utils::fs_utils::list_files;

    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let rpl = tmp.path().join("contiki/core/net/rpl");
        fs::create_dir_all(&rpl).unwrap();
        fs::write(rpl.join("rpl.c"), "original").unwrap();
        let ext = tmp.path().join("ext/rpl");
        fs::create_dir_all(&ext).unwrap();
        fs::write(ext.join("rpl.c"), "attack").unwrap();
        fs::write(ext.join("rpl-icmp6.c"), "attack").unwrap();
        let backup = tmp.path().join("exp/.tmp");
        (tmp, rpl, ext, backup)
    }

    #[test]
    fn install_and_restore() {
        let (_tmp, rpl, ext, backup) = setup();

        let swap = RplSwap::install(&rpl, &ext, &backup).unwrap();
        assert_eq!(fs::read_to_string(rpl.join("rpl.c")).unwrap(), "attack");
        assert!(rpl.join("rpl-icmp6.c").exists());

        swap.restore().unwrap();
        assert_eq!(list_files(&rpl).unwrap(), vec![PathBuf::from("rpl.c")]);
        assert_eq!(fs::read_to_string(rpl.join("rpl.c")).unwrap(), "original");
        assert!(!backup.exists());
        // the external library is left untouched
        assert_eq!(list_files(&ext).unwrap().len(), 2);
    }

    #[test]
    fn restored_on_drop() {
        let (_tmp, rpl, ext, backup) = setup();
        {
            let _swap = RplSwap::install(&rpl, &ext, &backup).unwrap();
        }
        assert_eq!(fs::read_to_string(rpl.join("rpl.c")).unwrap(), "original");
        assert!(!backup.exists());
    }

    #[test]
    fn failed_install_restores() {
        let (tmp, rpl, _ext, backup) = setup();
        let missing = tmp.path().join("missing");
        assert!(RplSwap::install(&rpl, &missing, &backup).is_err());
        assert_eq!(fs::read_to_string(rpl.join("rpl.c")).unwrap(), "original");
    }
}
