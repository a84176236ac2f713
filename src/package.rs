use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::Error;

const MIMETYPE_MEMBER: &str = "mimetype";

/// An opened template package with its content member decoded.
pub(crate) struct Package {
    archive: ZipArchive<File>,
    content_index: usize,
    content_name: String,
    pub(crate) content: String,
}

impl Package {
    pub(crate) fn open(path: &Path, content_member: &str) -> Result<Self, Error> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(Error::MalformedArchive)?;
        log::debug!("{}: {} members", path.display(), archive.len());

        check_mimetype(&mut archive);

        let content_index = archive
            .index_for_name(content_member)
            .ok_or_else(|| Error::MissingContentMember(content_member.to_string()))?;

        let mut bytes = Vec::new();
        archive
            .by_index(content_index)?
            .read_to_end(&mut bytes)?;
        let content = String::from_utf8(bytes)
            .map_err(|_| Error::InvalidEncoding(content_member.to_string()))?;

        Ok(Package {
            archive,
            content_index,
            content_name: content_member.to_string(),
            content,
        })
    }

    /// Write a copy of the package with the content member replaced.
    ///
    /// Other members are copied raw, in their original order. The archive is
    /// assembled in a temporary file next to `output` and renamed over it only
    /// once complete.
    pub(crate) fn write(&mut self, content: &str, output: &Path) -> Result<(), Error> {
        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = temp_file_in(dir, output)?;

        {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            for i in 0..self.archive.len() {
                if i == self.content_index {
                    let options = self.content_options()?;
                    writer.start_file(self.content_name.as_str(), options)?;
                    writer.write_all(content.as_bytes())?;
                } else {
                    let member = self.archive.by_index_raw(i)?;
                    writer.raw_copy_file(member)?;
                }
            }
            writer.finish()?;
        }

        tmp.as_file().sync_all()?;
        tmp.persist(output).map_err(|e| Error::from(e.error))?;
        log::info!("wrote {}", output.display());
        Ok(())
    }

    fn content_options(&mut self) -> Result<SimpleFileOptions, Error> {
        let member = self.archive.by_index(self.content_index)?;
        // Fixed timestamp keeps output byte-identical across runs.
        let mut options = SimpleFileOptions::default()
            .compression_method(member.compression())
            .last_modified_time(DateTime::default());
        if let Some(mode) = member.unix_mode() {
            options = options.unix_permissions(mode);
        }
        Ok(options)
    }
}

/// Temporary file that ends up with the mode a plain create would give:
/// the existing output's mode, else 0o666 less the umask.
fn temp_file_in(dir: &Path, output: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let tmp = builder.tempfile_in(dir)?;
    if let Ok(meta) = std::fs::metadata(output) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    Ok(tmp)
}

fn check_mimetype(archive: &mut ZipArchive<File>) {
    let first = archive
        .by_index_raw(0)
        .ok()
        .map(|m| (m.name().to_string(), m.compression()));
    match first {
        Some((name, CompressionMethod::Stored)) if name == MIMETYPE_MEMBER => {}
        Some((name, _)) if name == MIMETYPE_MEMBER => {
            log::warn!("'mimetype' member is compressed; some readers will reject the package")
        }
        _ => log::warn!("'mimetype' is not the first member; some readers will reject the package"),
    }
}
