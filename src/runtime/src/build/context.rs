//! Build context packaging.
//!
//! Streams a directory tree into an uncompressed tar archive in a single
//! pass. Every filesystem object becomes one entry named by its path relative
//! to the root; directories, symlinks and other non-regular files carry a
//! header only. Packaging `.` yields plain relative names (`a`, `b/c`), with
//! no `./` prefix and no entry for the root itself.
//!
//! The tree is not snapshotted: files changing during packaging produce
//! undefined archive content.

use std::fs::Metadata;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use traefiker_core::error::{DeployError, Result};

/// Size of the reusable file copy buffer.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Packs build contexts into tar archives.
///
/// Holds one copy buffer for its whole lifetime, so repeated builds do not
/// allocate per file.
pub struct ContextPackager {
    buf: Box<[u8]>,
}

impl Default for ContextPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPackager {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; COPY_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Write the archive of `root` into `out` and return the writer.
    pub fn package<W: Write>(&mut self, root: &Path, out: W) -> Result<W> {
        let mut builder = tar::Builder::new(out);
        builder.follow_symlinks(false);

        append_dir(&mut builder, root, root, &mut self.buf)?;

        builder
            .into_inner()
            .map_err(|e| DeployError::BuildError(format!("Failed to finalize build context: {}", e)))
    }

    /// Package `root` into an in-memory archive.
    pub fn package_to_vec(&mut self, root: &Path) -> Result<Vec<u8>> {
        self.package(root, Vec::new())
    }
}

/// Recursively append the children of `current`, sorted by name.
fn append_dir<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    current: &Path,
    buf: &mut [u8],
) -> Result<()> {
    let read_dir = std::fs::read_dir(current).map_err(|e| {
        DeployError::BuildError(format!(
            "Failed to read directory {}: {}",
            current.display(),
            e
        ))
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry
            .map_err(|e| DeployError::BuildError(format!("Failed to read directory entry: {}", e)))?;
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| {
            DeployError::BuildError(format!(
                "Failed to read metadata for {}: {}",
                path.display(),
                e
            ))
        })?;
        let relative = path
            .strip_prefix(root)
            .map_err(|e| {
                DeployError::BuildError(format!(
                    "Failed to compute relative path for {}: {}",
                    path.display(),
                    e
                ))
            })?
            .to_path_buf();

        append_entry(builder, &path, &relative, &metadata, buf)?;

        if metadata.is_dir() {
            append_dir(builder, root, &path, buf)?;
        }
    }

    Ok(())
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    relative: &Path,
    metadata: &Metadata,
    buf: &mut [u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_metadata(metadata);

    let file_type = metadata.file_type();
    let result = if file_type.is_file() {
        let file = std::fs::File::open(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Failed to open file for build context");
            DeployError::BuildError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let body = BufferedBody::new(file, buf);
        builder.append_data(&mut header, relative, body)
    } else if file_type.is_symlink() {
        header.set_size(0);
        let target = std::fs::read_link(path).map_err(|e| {
            DeployError::BuildError(format!("Failed to read link {}: {}", path.display(), e))
        })?;
        builder.append_link(&mut header, relative, target)
    } else {
        header.set_size(0);
        builder.append_data(&mut header, relative, io::empty())
    };

    result.map_err(|e| {
        DeployError::BuildError(format!(
            "Failed to add {} to build context: {}",
            relative.display(),
            e
        ))
    })
}

/// Reader that pulls file bodies through a borrowed fixed-size buffer.
struct BufferedBody<'a, R> {
    inner: R,
    buf: &'a mut [u8],
    pos: usize,
    filled: usize,
}

impl<'a, R: Read> BufferedBody<'a, R> {
    fn new(inner: R, buf: &'a mut [u8]) -> Self {
        Self {
            inner,
            buf,
            pos: 0,
            filled: 0,
        }
    }
}

impl<R: Read> Read for BufferedBody<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.filled {
            self.filled = self.inner.read(self.buf)?;
            self.pos = 0;
            if self.filled == 0 {
                return Ok(0);
            }
        }
        let n = out.len().min(self.filled - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
