mod cpio;
mod rpm;

use std::fs::File;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::error::ExtractError;

pub use self::rpm::{read_metadata, RpmMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarZstd,
    Rpm,
}

/// Suffix table, longest suffixes first so `.tar.gz` wins over `.gz`-less
/// lookups and `.tar.zst` over `.tar`.
static SUFFIXES: Lazy<Vec<(&'static str, ArchiveKind)>> = Lazy::new(|| {
    vec![
        (".tar.gz", ArchiveKind::TarGz),
        (".tgz", ArchiveKind::TarGz),
        (".crate", ArchiveKind::TarGz),
        (".tar.zst", ArchiveKind::TarZstd),
        (".tar", ArchiveKind::Tar),
        (".whl", ArchiveKind::Zip),
        (".jar", ArchiveKind::Zip),
        (".egg", ArchiveKind::Zip),
        (".zip", ArchiveKind::Zip),
        (".rpm", ArchiveKind::Rpm),
    ]
});

pub fn kind_for(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    SUFFIXES
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map(|(_, kind)| *kind)
}

pub fn can_extract(path: &Path) -> bool {
    kind_for(path).is_some()
}

/// Unpack `archive` below `target`, creating it as needed. A failed unpack
/// removes the target directory again: callers never see partial output.
pub fn extract(archive: &Path, target: &Path) -> Result<(), ExtractError> {
    let Some(kind) = kind_for(archive) else {
        return Err(ExtractError::UnsupportedFormat(archive.to_path_buf()));
    };
    std::fs::create_dir_all(target).map_err(|source| ExtractError::Io {
        path: target.to_path_buf(),
        source,
    })?;

    let result = unpack(kind, archive, target);
    if result.is_err() {
        let _ = std::fs::remove_dir_all(target);
    }
    result
}

fn unpack(kind: ArchiveKind, archive: &Path, target: &Path) -> Result<(), ExtractError> {
    let corrupt = |reason: &dyn std::fmt::Display| ExtractError::CorruptArchive {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    };

    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(open(archive)?).map_err(|e| corrupt(&e))?;
            zip.extract(target).map_err(|e| corrupt(&e))?;
        }
        ArchiveKind::TarGz => {
            let decoder = flate2::read::GzDecoder::new(open(archive)?);
            tar::Archive::new(decoder)
                .unpack(target)
                .map_err(|e| corrupt(&e))?;
        }
        ArchiveKind::TarZstd => {
            let decoder = zstd::stream::read::Decoder::new(open(archive)?).map_err(|e| corrupt(&e))?;
            tar::Archive::new(decoder)
                .unpack(target)
                .map_err(|e| corrupt(&e))?;
        }
        ArchiveKind::Tar => {
            tar::Archive::new(open(archive)?)
                .unpack(target)
                .map_err(|e| corrupt(&e))?;
        }
        ArchiveKind::Rpm => self::rpm::extract_rpm(archive, target)?,
    }
    Ok(())
}

fn open(path: &Path) -> Result<File, ExtractError> {
    File::open(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Declared license from an RPM header, if the file is an RPM carrying one.
pub fn declared_rpm_license(path: &Path) -> Option<String> {
    if kind_for(path) != Some(ArchiveKind::Rpm) {
        return None;
    }
    read_metadata(path).ok().and_then(|metadata| metadata.license)
}
