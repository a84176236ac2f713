//! Inspect the raw contents of an ODT file (which is a ZIP).
//!
//! Usage:
//!   odt-inspect <file.odt>                    list all ZIP entries
//!   odt-inspect <file.odt> <internal/path>    dump file (XML auto-formatted via xmllint)
//!   odt-inspect <file.odt> --grep <pattern>   search all XML members
//!   odt-inspect <file.odt> --text             print the paragraphs of content.xml

use std::fs;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use zip::ZipArchive;

const TEXT_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage:");
        eprintln!("  odt-inspect <file.odt>                    list ZIP entries");
        eprintln!("  odt-inspect <file.odt> <internal/path>    dump file");
        eprintln!("  odt-inspect <file.odt> --grep <pattern>   search XML members");
        eprintln!("  odt-inspect <file.odt> --text             print paragraph text");
        std::process::exit(1);
    }

    let file = fs::File::open(&args[1]).unwrap_or_else(|e| {
        eprintln!("Cannot open '{}': {e}", args[1]);
        std::process::exit(1);
    });
    let mut archive = ZipArchive::new(file).unwrap_or_else(|e| {
        eprintln!("Not a valid ZIP/ODT: {e}");
        std::process::exit(1);
    });

    match args.get(2).map(String::as_str) {
        None => list_entries(&mut archive),
        Some("--grep") => {
            let pattern = args.get(3).unwrap_or_else(|| {
                eprintln!("--grep requires a pattern");
                std::process::exit(1);
            });
            grep_entries(&mut archive, pattern);
        }
        Some("--text") => print_text(&mut archive),
        Some(path) => dump_entry(&mut archive, path),
    }
}

fn list_entries(archive: &mut ZipArchive<fs::File>) {
    println!("{:>9}  {:>9}  {:<8}  path", "bytes", "packed", "method");
    println!("{}", "-".repeat(60));
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).unwrap();
        if !entry.is_dir() {
            println!(
                "{:>9}  {:>9}  {:<8}  {}",
                entry.size(),
                entry.compressed_size(),
                format!("{:?}", entry.compression()),
                entry.name()
            );
        }
    }
}

fn dump_entry(archive: &mut ZipArchive<fs::File>, path: &str) {
    let mut entry = archive.by_name(path).unwrap_or_else(|_| {
        eprintln!("'{}' not found in archive", path);
        eprintln!("Run without a path argument to list available entries.");
        std::process::exit(1);
    });

    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();

    if path.ends_with(".xml") {
        // Try xmllint for pretty-printing; fall through to raw on failure
        if let Ok(mut child) = Command::new("xmllint")
            .args(["--format", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::null())
            .spawn()
        {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&content).unwrap();
            }
            child.wait().unwrap();
            return;
        }
    }

    io::stdout().write_all(&content).unwrap();
}

fn grep_entries(archive: &mut ZipArchive<fs::File>, pattern: &str) {
    let mut found = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().to_owned();
        if name.ends_with(".xml") {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap_or(0);
            for (n, line) in content.lines().enumerate() {
                if line.contains(pattern) {
                    println!("{}:{}: {}", name, n + 1, line.trim());
                    found += 1;
                }
            }
        }
    }
    if found == 0 {
        eprintln!("No matches for '{pattern}'");
    }
}

fn print_text(archive: &mut ZipArchive<fs::File>) {
    let mut content = String::new();
    archive
        .by_name("content.xml")
        .unwrap_or_else(|_| {
            eprintln!("'content.xml' not found in archive");
            std::process::exit(1);
        })
        .read_to_string(&mut content)
        .unwrap();
    let doc = roxmltree::Document::parse(&content).unwrap_or_else(|e| {
        eprintln!("content.xml is not well-formed: {e}");
        std::process::exit(1);
    });
    for para in doc.descendants().filter(|n| {
        n.tag_name().namespace() == Some(TEXT_NS) && matches!(n.tag_name().name(), "p" | "h")
    }) {
        let text: String = para
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect();
        println!("{text}");
    }
}
