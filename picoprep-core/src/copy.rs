//! Copying files and directory trees onto a mounted volume.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::volume::{VolumeObserver, WaitTiming, wait_for_volume};

/// Finder droppings; never deployed to the board.
pub const METADATA_FILE: &str = ".DS_Store";

/// Wait for `volume` to be mounted, copy `src` onto its root, then pause for
/// the settle delay. Writes to removable media are not guaranteed synchronous,
/// so the pause is an empirical safety margin rather than a flush guarantee.
pub fn copy_onto_volume<F>(
    volumes: &dyn VolumeObserver,
    src: &Path,
    volume: &Path,
    timing: &WaitTiming,
    running: &AtomicBool,
    on_wait: F,
) -> Result<()>
where
    F: FnMut(Duration),
{
    wait_for_volume(volumes, volume, timing, running, on_wait)?;
    copy_entry(src, volume)?;
    thread::sleep(timing.settle_delay);
    Ok(())
}

/// Copy a file or directory into `dest_dir`, keeping its name.
///
/// A file overwrites any existing destination file. A directory fully
/// replaces an existing destination directory: stale contents are removed
/// first, never merged. The OS metadata file is skipped throughout.
pub fn copy_entry(src: &Path, dest_dir: &Path) -> Result<()> {
    let name = src.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source {} has no file name", src.display()),
        )
    })?;
    let dest = dest_dir.join(name);

    log::debug!("copying {} -> {}", src.display(), dest.display());
    if src.is_dir() {
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        copy_dir_recursive(src, &dest)?;
    } else {
        fs::copy(src, &dest)?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_name() == METADATA_FILE {
            continue;
        }
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn entry_names(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn directory_copy_fully_replaces_stale_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("lib");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("keyboard.py"), "fresh").unwrap();

        let volume = tmp.path().join("CIRCUITPY");
        let stale = volume.join("lib");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old_module.py"), "stale").unwrap();
        fs::write(stale.join("keyboard.py"), "stale").unwrap();

        copy_entry(&src, &volume).unwrap();

        assert_eq!(
            entry_names(&volume.join("lib")),
            BTreeSet::from(["keyboard.py".to_string()])
        );
        assert_eq!(
            fs::read_to_string(volume.join("lib/keyboard.py")).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn metadata_file_is_skipped_in_directory_trees() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("project");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("code.py"), "print('hi')").unwrap();
        fs::write(src.join(METADATA_FILE), "junk").unwrap();
        fs::write(src.join("nested").join(METADATA_FILE), "junk").unwrap();
        fs::write(src.join("nested/data.txt"), "data").unwrap();

        let volume = tmp.path().join("CIRCUITPY");
        fs::create_dir(&volume).unwrap();
        copy_entry(&src, &volume).unwrap();

        let copied = volume.join("project");
        assert_eq!(
            entry_names(&copied),
            BTreeSet::from(["code.py".to_string(), "nested".to_string()])
        );
        assert_eq!(
            entry_names(&copied.join("nested")),
            BTreeSet::from(["data.txt".to_string()])
        );
    }

    #[test]
    fn single_file_copy_overwrites_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("code.py");
        fs::write(&src, "new").unwrap();

        let volume = tmp.path().join("CIRCUITPY");
        fs::create_dir(&volume).unwrap();
        fs::write(volume.join("code.py"), "old").unwrap();

        copy_entry(&src, &volume).unwrap();
        assert_eq!(fs::read_to_string(volume.join("code.py")).unwrap(), "new");
    }
}
