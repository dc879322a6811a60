//! Durable byte-stream copy.
//!
//! Deliberately a plain read/write loop: `std::io::copy` between two files
//! lowers to `copy_file_range(2)` on Linux, which reflinks or block-clones on
//! btrfs, XFS and OpenZFS 2.2+. A clone shares the original's blocks, and
//! the whole point of a rewrite is to get fresh ones.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use filetime::FileTime;

/// Copy buffer (1 MiB).
const COPY_BUF_SIZE: usize = 1024 * 1024;

/// Copy `src` to `dst`, preserving permission bits and timestamps.
///
/// Whatever already sits at `dst` is unlinked first and a fresh file is
/// created exclusively, so a leftover symlink or hard link at `dst` is never
/// written through. The copy is fsynced before returning, so a successful
/// return means the bytes are on stable storage. On error the partial
/// destination is removed.
///
/// Returns the number of bytes copied.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut source = File::open(src)?;
    let meta = source.metadata()?;

    match fs::remove_file(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use nix::fcntl::OFlag;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options
            .mode(meta.permissions().mode() & 0o7777)
            .custom_flags(OFlag::O_NOFOLLOW.bits());
    }
    let mut dest = options.open(dst)?;

    let result = stream_copy(&mut source, &mut dest).and_then(|copied| {
        drop(dest);
        stamp_metadata(dst, &meta)?;
        Ok(copied)
    });
    if result.is_err() {
        let _ = fs::remove_file(dst);
    }
    result
}

/// Mode and times of `meta` onto `dst`. The creation mode was filtered
/// through the umask.
fn stamp_metadata(dst: &Path, meta: &fs::Metadata) -> io::Result<()> {
    fs::set_permissions(dst, meta.permissions())?;

    let mtime = FileTime::from_last_modification_time(meta);
    let atime = FileTime::from_last_access_time(meta);
    filetime::set_file_times(dst, atime, mtime)
}

fn stream_copy(source: &mut File, dest: &mut File) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dest.write_all(&buf[..n])?;
        total += n as u64;
    }
    dest.sync_all()?;
    Ok(total)
}
