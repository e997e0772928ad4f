use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

use super::cpio;

/// Header fields extracted from an RPM package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpmMetadata {
    pub name: String,
    pub version: String,
    pub release: String,
    pub license: Option<String>,
    pub files: Vec<PathBuf>,
}

fn corrupt(path: &Path, reason: impl ToString) -> ExtractError {
    ExtractError::CorruptArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

pub fn read_metadata(path: &Path) -> Result<RpmMetadata, ExtractError> {
    let package = rpm::Package::open(path).map_err(|e| corrupt(path, e))?;
    let header = &package.metadata;
    Ok(RpmMetadata {
        name: header.get_name().map_err(|e| corrupt(path, e))?.to_string(),
        version: header
            .get_version()
            .map_err(|e| corrupt(path, e))?
            .to_string(),
        release: header
            .get_release()
            .map_err(|e| corrupt(path, e))?
            .to_string(),
        license: header.get_license().ok().map(|l| l.to_string()),
        files: header.get_file_paths().unwrap_or_default(),
    })
}

/// Unpack the RPM payload: the compressed cpio stream behind the headers.
/// The compressor is sniffed from the payload magic rather than trusted
/// from the header tag.
pub fn extract_rpm(archive: &Path, target: &Path) -> Result<(), ExtractError> {
    let package = rpm::Package::open(archive).map_err(|e| corrupt(archive, e))?;
    let payload =
        decompress_payload(&package.content).map_err(|reason| corrupt(archive, reason))?;
    cpio::unpack(&payload, target).map_err(|e| corrupt(archive, e))
}

fn decompress_payload(content: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    match content {
        [0x1f, 0x8b, ..] => {
            flate2::read::GzDecoder::new(content)
                .read_to_end(&mut out)
                .map_err(|e| e.to_string())?;
        }
        [0xfd, b'7', b'z', b'X', b'Z', 0x00, ..] => {
            xz2::read::XzDecoder::new(content)
                .read_to_end(&mut out)
                .map_err(|e| e.to_string())?;
        }
        [0x28, 0xb5, 0x2f, 0xfd, ..] => {
            out = zstd::decode_all(content).map_err(|e| e.to_string())?;
        }
        _ if content.starts_with(b"070701") || content.starts_with(b"070702") => {
            out.extend_from_slice(content);
        }
        _ => return Err("unrecognized payload compression".to_string()),
    }
    Ok(out)
}
