//! Writing of trust-store files.
use std::{io, path::Path};

/// Writes a file that may be read by anyone, like a certificate or a config.
pub(crate) fn write_public_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    std::fs::write(path, contents)
}

/// Writes a file containing private key material, readable only by the
/// current user.
#[cfg(unix)]
pub(crate) fn write_secret_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::{
        fs::{OpenOptions, Permissions},
        io::Write,
        os::unix::fs::{OpenOptionsExt, PermissionsExt},
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;

    // The mode only applies to newly created files.
    file.set_permissions(Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
pub(crate) fn write_secret_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    std::fs::write(path, contents)
}
