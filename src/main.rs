use clap::Parser;
use odtside_pdf::{
    BookmarkEdit, Converter, ConverterConfig, FillOptions, MissingPolicy, Values,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "odtside-pdf",
    about = "Fill placeholders in an ODT template and optionally convert it to PDF"
)]
struct Args {
    /// Template ODT file
    template: PathBuf,
    /// Filled ODT file (defaults to <template>-filled.odt)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Placeholder value as KEY=VALUE (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_pair)]
    set: Vec<(String, String)>,
    /// JSON object mapping placeholder names to values
    #[arg(long, value_name = "FILE")]
    values: Option<PathBuf>,
    /// Populate a bookmark as NAME=TEXT (repeatable)
    #[arg(long = "bookmark", value_name = "NAME=TEXT", value_parser = parse_pair)]
    bookmarks: Vec<(String, String)>,
    /// Add a paragraph after the one holding a bookmark, as NAME=TEXT
    #[arg(long = "paragraph-after", value_name = "NAME=TEXT", value_parser = parse_pair)]
    paragraphs: Vec<(String, String)>,
    /// Fail instead of leaving placeholders without a value in place
    #[arg(long)]
    strict: bool,
    /// Only list the placeholders found in the template
    #[arg(long)]
    list: bool,
    /// Convert the filled document to PDF
    #[arg(long)]
    pdf: bool,
    /// Directory for the PDF (defaults to the filled document's directory)
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Office suite executable (defaults to $ODTSIDE_SOFFICE or a platform guess)
    #[arg(long)]
    soffice: Option<PathBuf>,
    /// Give up on the converter after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Private office profile directory for the converter
    #[arg(long)]
    profile: Option<PathBuf>,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_values(path: &Path) -> Result<Values, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
        .map_err(|e| format!("{} is not a JSON object: {e}", path.display()))?;
    let mut values = Values::new();
    for (key, value) in map {
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => return Err(format!("value for '{key}' must be a scalar, got {other}")),
        };
        values.insert(key, text);
    }
    Ok(values)
}

fn default_output(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    template.with_file_name(format!("{stem}-filled.odt"))
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn fail_at(e: odtside_pdf::Error) -> ! {
    eprintln!("Error ({}): {e}", e.stage());
    std::process::exit(1);
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if !args.template.exists() {
        fail(format!("file not found: {}", args.template.display()));
    }
    if !args.template.is_file() {
        fail(format!("not a file: {}", args.template.display()));
    }

    let mut options = FillOptions::default();
    if args.strict {
        options.missing = MissingPolicy::Fail;
    }
    options.bookmarks.extend(
        args.bookmarks
            .into_iter()
            .map(|(bookmark, text)| BookmarkEdit::Populate { bookmark, text }),
    );
    options.bookmarks.extend(
        args.paragraphs
            .into_iter()
            .map(|(bookmark, text)| BookmarkEdit::ParagraphAfter { bookmark, text }),
    );

    if args.list {
        match odtside_pdf::scan_placeholders(&args.template, &options) {
            Ok(names) => names.iter().for_each(|n| println!("{n}")),
            Err(e) => fail_at(e),
        }
        return;
    }

    let mut values = match &args.values {
        Some(path) => load_values(path).unwrap_or_else(|e| fail(e)),
        None => Values::new(),
    };
    values.extend(args.set);

    let output = args
        .output
        .unwrap_or_else(|| default_output(&args.template));

    match odtside_pdf::fill_template(&args.template, &values, &output, &options) {
        Ok(report) => {
            if !report.unfilled.is_empty() {
                eprintln!("Warning: left unfilled: {}", report.unfilled.join(", "));
            }
        }
        Err(e) => fail_at(e),
    }

    if !args.pdf {
        println!("{}", output.display());
        return;
    }

    let mut config = match args.soffice {
        Some(program) => ConverterConfig::new(program),
        None => ConverterConfig::default(),
    };
    config.timeout = args.timeout.map(Duration::from_secs);
    config.profile_dir = args.profile;

    let outdir = args.outdir.unwrap_or_else(|| match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    });

    match Converter::new(config).convert(&output, &outdir) {
        Ok(pdf) => println!("{}", pdf.display()),
        Err(e) => fail_at(e),
    }
}
