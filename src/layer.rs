//! Layer codec: turns layer blobs into [`FilesystemEntry`] lists and back.
//!
//! Decoding accepts plain or gzipped tar streams and understands overlay
//! whiteout markers (`.wh.<name>` and `.wh..wh..opq`). Encoding produces a
//! reproducible gzipped tar: the same entries always yield the same blob and
//! therefore the same digest.

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::image::{ContentRef, EntryKind, FilesystemEntry, Layer};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use oci_spec::image::MediaType;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar_rs as tar;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// Parses a layer blob as found in an image archive or a store.
pub fn decode(blob: Vec<u8>) -> Result<Layer> {
    let digest = Digest::of(&blob);
    let compressed = blob.starts_with(&GZIP_MAGIC);

    let (diff_id, entries) = {
        let stream: Cow<'_, [u8]> = if compressed {
            let mut out = Vec::new();
            GzDecoder::new(blob.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| Error::layer(format!("{}: gzip", digest.short()), e))?;
            Cow::Owned(out)
        } else {
            Cow::Borrowed(blob.as_slice())
        };

        let entries = read_entries(&stream)
            .map_err(|e| Error::layer(format!("{}: tar", digest.short()), e))?;
        (Digest::of(&stream), entries)
    };
    log::debug!(
        "Decoded layer {} with {} entries",
        digest.short(),
        entries.len()
    );

    let media_type = if compressed {
        MediaType::ImageLayerGzip
    } else {
        MediaType::ImageLayer
    };

    Ok(Layer {
        digest,
        diff_id,
        media_type,
        blob: blob.into(),
        entries: entries.into(),
    })
}

/// Writes `entries`, in the order given, into a gzipped tar layer.
///
/// Headers carry only what the entries record (mode, owner, mtime), so the
/// output does not depend on the machine or the time it was built on.
pub fn encode(entries: &[FilesystemEntry]) -> Result<Layer> {
    let stream = write_entries(entries).map_err(|e| Error::layer("encode: tar", e))?;
    let diff_id = Digest::of(&stream);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&stream)
        .map_err(|e| Error::layer("encode: gzip", e))?;
    let blob = encoder
        .finish()
        .map_err(|e| Error::layer("encode: gzip", e))?;

    Ok(Layer {
        digest: Digest::of(&blob),
        diff_id,
        media_type: MediaType::ImageLayerGzip,
        blob: blob.into(),
        entries: entries.to_vec().into(),
    })
}

/// Makes a tar path absolute and keeps it from escaping the root.
fn normalize_tar_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");

    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    out
}

fn read_entries(stream: &[u8]) -> io::Result<Vec<FilesystemEntry>> {
    let mut archive = tar::Archive::new(stream);
    let mut entries: Vec<FilesystemEntry> = Vec::new();
    // Last index of each regular file, for hardlink resolution.
    let mut files: HashMap<PathBuf, usize> = HashMap::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let path = normalize_tar_path(&entry.path()?);
        if path == Path::new("/") {
            continue;
        }

        let header = entry.header();
        let entry_type = header.entry_type();
        let mode = header.mode().unwrap_or(0o644);
        let uid = header.uid().unwrap_or(0);
        let gid = header.gid().unwrap_or(0);
        let mtime = header.mtime().unwrap_or(0);

        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            if file_name == OPAQUE_MARKER {
                if let Some(parent) = path.parent() {
                    entries.push(FilesystemEntry::opaque(parent));
                }
                continue;
            } else if let Some(deleted) = file_name.strip_prefix(WHITEOUT_PREFIX) {
                if let Some(parent) = path.parent() {
                    entries.push(FilesystemEntry::whiteout(parent.join(deleted)));
                }
                continue;
            }
        }

        let (kind, content) = match entry_type {
            tar::EntryType::Directory => (EntryKind::Dir, None),
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                (EntryKind::File, Some(ContentRef::new(data)))
            }
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (EntryKind::Symlink { target }, None)
            }
            tar::EntryType::Link => {
                let target = entry.link_name()?.map(|t| normalize_tar_path(&t));
                match target.and_then(|t| files.get(&t).map(|&i| &entries[i])) {
                    Some(original) => (EntryKind::File, original.content.clone()),
                    None => {
                        log::warn!(
                            "Skipping hardlink with missing target: {}",
                            path.display()
                        );
                        continue;
                    }
                }
            }
            other => {
                log::debug!("Skipping {:?} entry: {}", other, path.display());
                continue;
            }
        };

        let size = content.as_ref().map(|c| c.data.len() as u64).unwrap_or(0);
        if kind == EntryKind::File {
            files.insert(path.clone(), entries.len());
        } else {
            files.remove(&path);
        }

        entries.push(FilesystemEntry {
            path,
            kind,
            mode,
            size,
            uid,
            gid,
            mtime,
            content,
        });
    }

    Ok(entries)
}

fn write_entries(entries: &[FilesystemEntry]) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in entries {
        let rel = entry.path.strip_prefix("/").unwrap_or(&entry.path);

        let mut header = tar::Header::new_gnu();
        header.set_mode(entry.mode);
        header.set_uid(entry.uid);
        header.set_gid(entry.gid);
        header.set_mtime(entry.mtime);
        header.set_size(0);

        match &entry.kind {
            EntryKind::File => {
                let data: &[u8] = entry.content.as_ref().map(|c| &c.data[..]).unwrap_or(&[]);
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, rel, data)?;
            }
            EntryKind::Dir => {
                header.set_entry_type(tar::EntryType::Directory);
                builder.append_data(&mut header, rel, io::empty())?;
            }
            EntryKind::Symlink { target } => {
                header.set_entry_type(tar::EntryType::Symlink);
                builder.append_link(&mut header, rel, target)?;
            }
            EntryKind::Whiteout => {
                let name = rel.file_name().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "whiteout of the root")
                })?;
                let mut marker = std::ffi::OsString::from(WHITEOUT_PREFIX);
                marker.push(name);
                let marker = rel.with_file_name(marker);
                header.set_entry_type(tar::EntryType::Regular);
                builder.append_data(&mut header, marker, io::empty())?;
            }
            EntryKind::OpaqueWhiteout => {
                header.set_entry_type(tar::EntryType::Regular);
                builder.append_data(&mut header, rel.join(OPAQUE_MARKER), io::empty())?;
            }
        }
    }

    builder.into_inner()
}
