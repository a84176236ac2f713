use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_encode};

use crate::error::Error;

pub const DEFAULT_FILTER: &str = "pdf:writer_pdf_Export";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the output pipes to close once the converter is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// RFC 3986 unreserved characters plus the path separators stay literal.
const URL_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b':');

#[derive(Clone, Debug)]
pub struct ConverterConfig {
    /// Converter executable: a path, or a bare name looked up on `PATH`.
    pub program: PathBuf,
    pub timeout: Option<Duration>,
    pub filter: String,
    /// Private user profile so runs don't contend for the shared profile lock.
    pub profile_dir: Option<PathBuf>,
}

impl ConverterConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ConverterConfig {
            program: program.into(),
            timeout: None,
            filter: DEFAULT_FILTER.to_string(),
            profile_dir: None,
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig::new(default_program())
    }
}

/// Best guess at the office suite binary for this host.
///
/// `ODTSIDE_SOFFICE` wins when set, then well-known install locations,
/// then plain `soffice` resolved through `PATH`.
pub fn default_program() -> PathBuf {
    if let Ok(val) = std::env::var("ODTSIDE_SOFFICE") {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    let mut candidates: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "macos")]
    {
        candidates.push("/Applications/LibreOffice.app/Contents/MacOS/soffice".into());
    }

    #[cfg(target_os = "linux")]
    {
        candidates.extend([
            "/usr/bin/soffice".into(),
            "/usr/lib/libreoffice/program/soffice".into(),
            "/opt/libreoffice/program/soffice".into(),
        ]);
    }

    #[cfg(target_os = "windows")]
    {
        candidates.extend([
            "C:\\Program Files\\LibreOffice\\program\\soffice.exe".into(),
            "C:\\Program Files (x86)\\LibreOffice\\program\\soffice.exe".into(),
        ]);
    }

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from("soffice"))
}

pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Converter { config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Resolve the configured program to an executable on disk.
    pub fn locate(&self) -> Result<PathBuf, Error> {
        which::which(&self.config.program)
            .map_err(|_| Error::ExternalToolNotFound(self.config.program.clone()))
    }

    /// Path the converter is expected to write for `input`.
    pub fn expected_output(input: &Path, outdir: &Path) -> PathBuf {
        let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
        name.push(".pdf");
        outdir.join(name)
    }

    /// Convert `input` to PDF inside `outdir`, blocking until the converter
    /// exits. Returns the path of the PDF it wrote.
    pub fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, Error> {
        if !input.is_file() {
            return Err(Error::converting(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input document not found: {}", input.display()),
            )));
        }
        let program = self.locate()?;
        std::fs::create_dir_all(outdir).map_err(Error::converting)?;

        let expected = Self::expected_output(input, outdir);
        if expected.exists() {
            log::debug!("removing stale {}", expected.display());
            std::fs::remove_file(&expected).map_err(Error::converting)?;
        }

        let mut command = self.command(&program, input, outdir)?;
        log::debug!("running {command:?}");

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ExternalToolNotFound(program.clone()),
            _ => Error::converting(e),
        })?;
        let stderr = Drain::start(child.stderr.take());
        let stdout = Drain::start(child.stdout.take());

        let status = match self.config.timeout {
            Some(limit) => wait_with_timeout(&mut child, limit)?,
            None => Some(child.wait().map_err(Error::converting)?),
        };

        // Pipes may outlive the child when it forked; never wait on them forever.
        let diagnostics = collect([stderr, stdout], Instant::now() + DRAIN_GRACE);
        let Some(status) = status else {
            let limit = self.config.timeout.unwrap_or_default();
            log::warn!("converter killed after {limit:?}: {diagnostics}");
            if expected.exists() {
                std::fs::remove_file(&expected).map_err(Error::converting)?;
            }
            return Err(Error::Timeout(limit));
        };

        log::info!(
            "converter exited with {status} after {:.2?}",
            started.elapsed()
        );
        if !status.success() {
            return Err(Error::ConversionFailed {
                status: status.code(),
                diagnostics,
            });
        }
        if !expected.is_file() {
            // Exits zero without output when another instance owns the profile.
            return Err(Error::ConversionFailed {
                status: None,
                diagnostics,
            });
        }
        Ok(expected)
    }

    fn command(&self, program: &Path, input: &Path, outdir: &Path) -> Result<Command, Error> {
        let mut command = Command::new(program);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg(&self.config.filter)
            .arg("--outdir")
            .arg(outdir);
        if let Some(profile) = &self.config.profile_dir {
            std::fs::create_dir_all(profile).map_err(Error::converting)?;
            command.arg(format!("-env:UserInstallation={}", file_url(profile)?));
        }
        command
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout takes down whatever the converter forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        Ok(command)
    }
}

/// Returns `None` if the child had to be killed.
fn wait_with_timeout(child: &mut Child, limit: Duration) -> Result<Option<ExitStatus>, Error> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(Error::converting)? {
            return Ok(Some(status));
        }
        if start.elapsed() > limit {
            kill_tree(child);
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // The child leads its own group (see `command`), so its pid is the pgid.
    let pgid = child.id() as libc::pid_t;
    unsafe { libc::kill(-pgid, libc::SIGKILL) };
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Output pipe read on a background thread. The thread is never joined,
/// so a pipe held open by a grandchild cannot block the caller.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Drain {
    fn start<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Drain> {
        let mut pipe = pipe?;
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let (tx, done) = mpsc::channel();
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(());
        });
        Some(Drain { buf, done })
    }

    /// Whatever was read by `deadline`.
    fn finish(self, deadline: Instant) -> Vec<u8> {
        let _ = self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()));
        self.buf.lock().map(|buf| buf.clone()).unwrap_or_default()
    }
}

fn collect(drains: [Option<Drain>; 2], deadline: Instant) -> String {
    let mut out = String::new();
    for drain in drains.into_iter().flatten() {
        let bytes = drain.finish(deadline);
        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim();
        if !text.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text);
        }
    }
    out
}

fn file_url(path: &Path) -> Result<String, Error> {
    let absolute = std::path::absolute(path).map_err(Error::converting)?;
    let mut text = absolute.to_string_lossy().replace('\\', "/");
    if !text.starts_with('/') {
        text.insert(0, '/');
    }
    Ok(format!("file://{}", percent_encode(text.as_bytes(), URL_PATH)))
}
