//! Minimal reader for the `newc` cpio format carried as RPM payload.
//!
//! Header layout: 6-byte magic, then 13 fields of 8 ASCII hex digits each,
//! then the NUL-terminated entry name; name and data are 4-byte aligned
//! relative to the archive start.

use std::io;
use std::path::{Component, Path, PathBuf};

const MAGIC_CRC: &[u8] = b"070702";
const MAGIC_NEWC: &[u8] = b"070701";
const HEADER_LEN: usize = 110;
const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn hex_field(header: &[u8], index: usize) -> io::Result<u32> {
    let start = 6 + index * 8;
    let raw = &header[start..start + 8];
    let text = std::str::from_utf8(raw)
        .map_err(|_| invalid("non-ascii cpio header field".to_string()))?;
    u32::from_str_radix(text, 16).map_err(|_| invalid(format!("bad cpio header field `{text}`")))
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Entry names are archive-controlled; anything escaping the target
/// (absolute paths, `..`) is dropped rather than written.
fn sanitized(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

pub fn unpack(data: &[u8], target: &Path) -> io::Result<()> {
    let mut offset = 0usize;
    loop {
        let header = data
            .get(offset..offset + HEADER_LEN)
            .ok_or_else(|| invalid("truncated cpio header".to_string()))?;
        if &header[..6] != MAGIC_NEWC && &header[..6] != MAGIC_CRC {
            return Err(invalid("bad cpio magic".to_string()));
        }

        let mode = hex_field(header, 1)?;
        let file_size = hex_field(header, 6)? as usize;
        let name_size = hex_field(header, 11)? as usize;

        let name_start = offset + HEADER_LEN;
        let name_bytes = data
            .get(name_start..name_start + name_size)
            .ok_or_else(|| invalid("truncated cpio entry name".to_string()))?;
        let name_end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = std::str::from_utf8(&name_bytes[..name_end])
            .map_err(|_| invalid("non-utf8 cpio entry name".to_string()))?;

        if name == TRAILER {
            return Ok(());
        }

        let data_start = align4(name_start + name_size);
        let contents = data
            .get(data_start..data_start + file_size)
            .ok_or_else(|| invalid(format!("truncated cpio data for `{name}`")))?;
        offset = align4(data_start + file_size);

        let Some(rel) = sanitized(name) else {
            continue;
        };
        let dest = target.join(rel);
        match mode & S_IFMT {
            S_IFDIR => {
                std::fs::create_dir_all(&dest)?;
            }
            S_IFLNK => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let link = std::str::from_utf8(contents)
                    .map_err(|_| invalid(format!("non-utf8 symlink target for `{name}`")))?;
                make_symlink(link, &dest)?;
            }
            _ => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&dest, contents)?;
            }
        }
    }
}

#[cfg(unix)]
fn make_symlink(link: &str, dest: &Path) -> io::Result<()> {
    match std::os::unix::fs::symlink(link, dest) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

#[cfg(not(unix))]
fn make_symlink(link: &str, dest: &Path) -> io::Result<()> {
    std::fs::write(dest, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, mode: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC_NEWC);
        let fields = [
            0u32,
            mode,
            0,
            0,
            1,
            0,
            data.len() as u32,
            0,
            0,
            0,
            0,
            (name.len() + 1) as u32,
            0,
        ];
        for field in fields {
            out.extend_from_slice(format!("{field:08x}").as_bytes());
        }
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn archive(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for e in entries {
            out.extend_from_slice(e);
        }
        out.extend_from_slice(&entry(TRAILER, 0, b""));
        out
    }

    #[test]
    fn unpacks_directories_files_and_symlinks() {
        let data = archive(&[
            entry("docs", 0o040755, b""),
            entry("docs/COPYING", 0o100644, b"license text\n"),
            entry("lib64/libaio.so.1", 0o120777, b"libaio.so.1.0.1"),
        ]);

        let dir = tempfile::tempdir().unwrap();
        unpack(&data, dir.path()).unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("docs/COPYING")).unwrap(),
            b"license text\n"
        );
        #[cfg(unix)]
        assert_eq!(
            std::fs::read_link(dir.path().join("lib64/libaio.so.1")).unwrap(),
            Path::new("libaio.so.1.0.1")
        );
    }

    #[test]
    fn entries_escaping_the_target_are_dropped() {
        let data = archive(&[
            entry("../evil", 0o100644, b"nope"),
            entry("./ok.txt", 0o100644, b"fine"),
        ]);

        let dir = tempfile::tempdir().unwrap();
        unpack(&data, dir.path()).unwrap();

        assert!(dir.path().join("ok.txt").exists());
        assert!(!dir.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut data = archive(&[entry("f", 0o100644, b"abc")]);
        data.truncate(40);
        assert!(unpack(&data, Path::new("/nonexistent-target")).is_err());
    }

    #[test]
    fn bad_magic_is_an_error() {
        let err = unpack(b"0630990000000000", Path::new("/nonexistent-target")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
