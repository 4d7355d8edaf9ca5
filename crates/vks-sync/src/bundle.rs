//! Key bundle directories: one `<public_key>.enc` envelope file per key

use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::export::ExportedKey;
use crate::transfer::TransferFile;
use vks_core::VksResult;
use vks_crypto::encode_file;

pub const BUNDLE_EXTENSION: &str = "enc";

/// Write each exported key to `dir/<public_key>.enc`, creating `dir`.
/// Returns the number of files written.
pub fn write_export(dir: &Path, keys: &[ExportedKey]) -> VksResult<usize> {
    fs::create_dir_all(dir)?;

    for key in keys {
        let path = dir.join(format!("{}.{BUNDLE_EXTENSION}", key.public_key));
        let data = encode_file(&key.envelope)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        // mode() only applies on create; tighten a file left by an earlier export
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(&data)?;
        debug!(path = %path.display(), "wrote envelope file");
    }

    info!(dir = %dir.display(), count = keys.len(), "export written");
    Ok(keys.len())
}

/// Read every `*.enc` file in `dir`, sorted by file name. The file stem is
/// the public-key hint. Other files and subdirectories are ignored.
pub fn read_bundle(dir: &Path) -> VksResult<Vec<TransferFile>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(BUNDLE_EXTENSION)
        })
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hint = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(TransferFile {
            name,
            hint,
            data: fs::read(&path)?,
        });
    }

    debug!(dir = %dir.display(), count = files.len(), "read transfer bundle");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vks_core::Envelope;

    fn exported(public_key: &str, fill: u8) -> ExportedKey {
        ExportedKey {
            public_key: public_key.to_string(),
            envelope: Envelope {
                wrapped_session_key: Some(vec![fill; 104]),
                nonce: [fill; 24],
                auth_tag: [fill; 16],
                ciphertext: vec![fill; 32],
            },
        }
    }

    #[test]
    fn test_write_then_read_sorted() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/out");
        let keys = vec![exported("0xbb", 2), exported("0xaa", 1)];

        assert_eq!(write_export(&dir, &keys).unwrap(), 2);
        std::fs::write(dir.join("README.txt"), b"ignored").unwrap();

        let files = read_bundle(&dir).unwrap();
        let hints: Vec<&str> = files.iter().map(|f| f.hint.as_str()).collect();
        assert_eq!(hints, vec!["0xaa", "0xbb"]);
        assert_eq!(files[0].name, "0xaa.enc");
        assert_eq!(files[0].data.len(), 144 + 32);
        assert_eq!(files[0].data[0], 1);
    }

    #[test]
    fn test_read_missing_dir_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = read_bundle(&tmp.path().join("absent"));
        assert!(matches!(result, Err(vks_core::VksError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_export_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write_export(tmp.path(), &[exported("0xcc", 3)]).unwrap();
        let mode = std::fs::metadata(tmp.path().join("0xcc.enc"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_reexport_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0xdd.enc");
        std::fs::write(&path, b"stale").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_export(tmp.path(), &[exported("0xdd", 4)]).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(meta.len(), 144 + 32);
    }
}
