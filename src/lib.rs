mod bookmark;
mod convert;
mod error;
mod model;
mod package;
mod template;

pub use convert::{Converter, ConverterConfig, DEFAULT_FILTER, default_program};
pub use error::{Error, Stage};
pub use model::{
    BookmarkEdit, CONTENT_MEMBER, FillOptions, FillReport, MissingPolicy, PlaceholderSyntax,
    Values,
};

use std::path::{Path, PathBuf};

use package::Package;
use template::Placeholders;

/// Fill `template` with `values` and write the result to `output`.
///
/// Every member except the content member is copied byte-for-byte. Nothing
/// is written to `output` unless the whole package was assembled.
pub fn fill_template(
    template: &Path,
    values: &Values,
    output: &Path,
    options: &FillOptions,
) -> Result<FillReport, Error> {
    let placeholders = Placeholders::new(&options.syntax)?;
    let mut package = Package::open(template, &options.content_member)?;
    roxmltree::Document::parse(&package.content)?;

    let edited = bookmark::apply(&package.content, &options.bookmarks)?;
    let (filled, report) = placeholders.fill(&edited, values, options.missing)?;
    roxmltree::Document::parse(&filled)?;

    package.write(&filled, output)?;
    log::info!(
        "filled {} placeholder(s) from {}",
        report.total_substitutions(),
        template.display()
    );
    Ok(report)
}

/// Placeholder names found in the template's content, in document order.
pub fn scan_placeholders(template: &Path, options: &FillOptions) -> Result<Vec<String>, Error> {
    let placeholders = Placeholders::new(&options.syntax)?;
    let package = Package::open(template, &options.content_member)?;
    Ok(placeholders.scan(&package.content))
}

/// Fill `template` and convert it, leaving `<outdir>/<template stem>.pdf`.
///
/// The intermediate document lives in a private temporary directory.
pub fn render_pdf(
    template: &Path,
    values: &Values,
    outdir: &Path,
    options: &FillOptions,
    converter: &Converter,
) -> Result<PathBuf, Error> {
    let workdir = tempfile::tempdir()?;
    let name = template.file_name().ok_or_else(|| {
        Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("template path has no file name: {}", template.display()),
        ))
    })?;
    let filled = workdir.path().join(name);
    fill_template(template, values, &filled, options)?;
    converter.convert(&filled, outdir)
}
