//! Unpacking downloaded packages into a staging directory.

use flate2::read::GzDecoder;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::trace;

/// Whether a download should be unpacked as a gzipped tarball.
pub(crate) fn is_tarball(file_name: &str) -> bool {
    file_name.ends_with(".tgz") || file_name.ends_with(".tar.gz")
}

/// Unpack a `.tgz` into `dest`, dropping the leading directory (`package/`
/// for npm tarballs).
///
/// Symlinks must point inside `dest`, and no entry may be written through a
/// link that leads elsewhere.
pub(crate) fn unpack_tarball(data: &[u8], dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if !matches!(
            kind,
            EntryType::Regular | EntryType::Directory | EntryType::Symlink
        ) {
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(relative) = strip_first_component(&path)? else {
            continue;
        };

        if kind == EntryType::Symlink {
            let link = entry.link_name()?.unwrap_or_default();
            check_link_target(&relative, &link)?;
        }

        let target = root.join(&relative);
        trace!(?target, "Unpacking entry");
        ensure_within(&root, &target)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    Ok(())
}

/// Write a single-file download (e.g. a bundled `yarn.js`) as an executable.
pub(crate) fn write_file(data: &[u8], dest: &Path, file_name: &str) -> io::Result<PathBuf> {
    let target = dest.join(file_name);
    std::fs::write(&target, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&target)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&target, perms)?;
    }

    Ok(target)
}

/// Reject link targets that are absolute or climb above the archive root.
fn check_link_target(relative: &Path, link: &Path) -> io::Result<()> {
    let escapes = || {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "archive link escapes its root: {} -> {}",
                relative.display(),
                link.display()
            ),
        )
    };

    if link.as_os_str().is_empty() {
        return Err(escapes());
    }
    let mut depth = relative.components().count().saturating_sub(1);
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => depth = depth.checked_sub(1).ok_or_else(escapes)?,
            Component::RootDir | Component::Prefix(_) => return Err(escapes()),
        }
    }
    Ok(())
}

/// Fail when the deepest existing ancestor of `target` resolves outside
/// `root`, which happens once an earlier entry planted a link.
fn ensure_within(root: &Path, target: &Path) -> io::Result<()> {
    for ancestor in target.ancestors() {
        if let Ok(resolved) = ancestor.canonicalize() {
            if resolved.starts_with(root) {
                return Ok(());
            }
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("archive entry resolves outside its root: {}", target.display()),
            ));
        }
    }
    Ok(())
}

/// Drop the first path component. Entries that would escape the destination
/// are rejected; the top-level directory itself yields `None`.
fn strip_first_component(path: &Path) -> io::Result<Option<PathBuf>> {
    let escapes = || {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("archive entry escapes its root: {}", path.display()),
        )
    };

    let mut components = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir));
    if !matches!(components.next(), Some(Component::Normal(_))) {
        return Err(escapes());
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return Err(escapes()),
        }
    }
    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a gzipped tarball from `(path, content)` pairs.
    pub(crate) fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_strips_leading_directory() {
        let data = tarball(&[
            ("package/package.json", r#"{"name":"pm"}"#),
            ("package/bin/pm.js", "console.log('pm')"),
        ]);
        let dir = tempfile::tempdir().unwrap();

        unpack_tarball(&data, dir.path()).unwrap();

        assert!(dir.path().join("package.json").is_file());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("bin/pm.js")).unwrap(),
            "console.log('pm')"
        );
        assert!(!dir.path().join("package").exists());
    }

    #[test]
    fn test_unpack_rejects_parent_components() {
        let mut header = tar::Header::new_gnu();
        let name = b"package/../../evil.js";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append(&header, "evil".as_bytes()).unwrap();
        let data = builder.into_inner().unwrap().finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = unpack_tarball(&data, dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    fn with_links(links: &[(&str, &str)], files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, target) in links {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            builder.append_link(&mut header, path, target).unwrap();
        }
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_rejects_link_outside_root() {
        let outside = tempfile::tempdir().unwrap();
        let outside_path = outside.path().to_str().unwrap();
        let data = with_links(
            &[("package/evil", outside_path)],
            &[("package/evil/pwned.txt", "pwned")],
        );
        let dir = tempfile::tempdir().unwrap();

        let err = unpack_tarball(&data, dir.path()).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!outside.path().join("pwned.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_rejects_relative_link_climbing_out() {
        let data = with_links(&[("package/bin/up", "../../..")], &[]);
        let dir = tempfile::tempdir().unwrap();

        let err = unpack_tarball(&data, dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_keeps_links_inside_root() {
        let data = with_links(
            &[("package/bin/pm", "../lib/pm.js")],
            &[("package/lib/pm.js", "console.log('pm')")],
        );
        let dir = tempfile::tempdir().unwrap();

        unpack_tarball(&data, dir.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("bin/pm")).unwrap(),
            "console.log('pm')"
        );
    }

    #[test]
    fn test_link_target_depth() {
        assert!(check_link_target(Path::new("bin/pm"), Path::new("../lib/pm.js")).is_ok());
        assert!(check_link_target(Path::new("pm"), Path::new("../pm.js")).is_err());
        assert!(check_link_target(Path::new("pm"), Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_write_file_is_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(b"#!/usr/bin/env node", dir.path(), "yarn.js").unwrap();
        assert_eq!(path, dir.path().join("yarn.js"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_is_tarball() {
        assert!(is_tarball("pnpm-9.1.0.tgz"));
        assert!(is_tarball("pm.tar.gz"));
        assert!(!is_tarball("yarn.js"));
    }
}
