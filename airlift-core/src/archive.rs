//! Tar and tar.gz archive creation
//!
//! Per-artifact `.tar` files hold one OCI layout each; the final bundle is a
//! gzip-compressed tar of the whole staging tree. Both are written to a
//! `.partial` sibling first and renamed into place, so a failed run never
//! leaves a truncated file under the destination name.

use std::path::Path;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;

/// Archive a directory's contents (not the directory itself) into an
/// uncompressed tar at `dest_tar`. Extracting the result reproduces the
/// directory contents at the extraction root.
pub fn tar_dir(src_dir: &Path, dest_tar: &Path) -> Result<()> {
    let partial = partial_path(dest_tar);

    let result = (|| -> Result<()> {
        let file = std::fs::File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;

        let mut builder = Builder::new(file);
        append_contents(&mut builder, src_dir)?;
        builder.into_inner().context("Failed to finalize tar")?;
        Ok(())
    })();

    finish(result, &partial, dest_tar)
}

/// Archive a directory's contents into a gzip-compressed tar at `dest_targz`.
pub fn tar_gz_dir(src_dir: &Path, dest_targz: &Path) -> Result<()> {
    let partial = partial_path(dest_targz);

    let result = (|| -> Result<()> {
        let file = std::fs::File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;

        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);
        append_contents(&mut builder, src_dir)?;

        let encoder = builder.into_inner().context("Failed to finalize tar")?;
        encoder.finish().context("Failed to compress tar")?;
        Ok(())
    })();

    finish(result, &partial, dest_targz)
}

fn append_contents<W: std::io::Write>(builder: &mut Builder<W>, src_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(src_dir)
        .with_context(|| format!("Failed to read directory: {}", src_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();

        if path.is_dir() {
            builder
                .append_dir_all(&name, &path)
                .with_context(|| format!("Failed to archive {}", path.display()))?;
        } else {
            builder
                .append_path_with_name(&path, &name)
                .with_context(|| format!("Failed to archive {}", path.display()))?;
        }
    }
    Ok(())
}

fn partial_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    std::path::PathBuf::from(name)
}

fn finish(result: Result<()>, partial: &Path, dest: &Path) -> Result<()> {
    match result {
        Ok(()) => std::fs::rename(partial, dest)
            .with_context(|| format!("Failed to move archive into place: {}", dest.display())),
        Err(e) => {
            let _ = std::fs::remove_file(partial);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        std::fs::create_dir_all(dir.join("blobs/sha256")).unwrap();
        std::fs::write(dir.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        std::fs::write(dir.join("index.json"), "{}").unwrap();
        std::fs::write(dir.join("blobs/sha256/deadbeef"), b"blob").unwrap();
    }

    #[test]
    fn test_tar_dir_roundtrip() -> Result<()> {
        let src = TempDir::new()?;
        populate(src.path());

        let out = TempDir::new()?;
        let tar_path = out.path().join("layout.tar");
        tar_dir(src.path(), &tar_path)?;

        let extract = TempDir::new()?;
        let mut archive = tar::Archive::new(std::fs::File::open(&tar_path)?);
        archive.unpack(extract.path())?;

        assert!(extract.path().join("oci-layout").is_file());
        assert!(extract.path().join("index.json").is_file());
        assert!(extract.path().join("blobs/sha256/deadbeef").is_file());
        Ok(())
    }

    #[test]
    fn test_tar_gz_dir_roundtrip() -> Result<()> {
        let src = TempDir::new()?;
        std::fs::create_dir_all(src.path().join("images")).unwrap();
        std::fs::write(src.path().join("VERSION"), "bundle_version: 2025.01.0\n")?;
        std::fs::write(src.path().join("images/app.tar"), b"tar bytes")?;

        let out = TempDir::new()?;
        let targz_path = out.path().join("bundle.tar.gz");
        tar_gz_dir(src.path(), &targz_path)?;

        let extract = TempDir::new()?;
        let decoder = GzDecoder::new(std::fs::File::open(&targz_path)?);
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(extract.path())?;

        assert!(extract.path().join("VERSION").is_file());
        assert!(extract.path().join("images/app.tar").is_file());
        Ok(())
    }

    #[test]
    fn test_no_partial_file_left_on_failure() {
        let out = TempDir::new().unwrap();
        let tar_path = out.path().join("missing.tar");

        let missing_src = out.path().join("does-not-exist");
        assert!(tar_dir(&missing_src, &tar_path).is_err());

        assert!(!tar_path.exists());
        assert!(!partial_path(&tar_path).exists());
    }
}
