use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only log file kept under `max_size` bytes for the life of the process.
///
/// Once an append pushes the file past the limit, the older half is dropped.
/// If the file is removed underneath the writer it is created again. A
/// `max_size` of zero disables trimming.
struct BoundedLogFile {
    path: PathBuf,
    max_size: u64,
    file: File,
    len: u64,
}

impl BoundedLogFile {
    fn open(path: PathBuf, max_size: u64) -> io::Result<Self> {
        let file = open_append(&path)?;
        let len = file.metadata()?.len();
        let mut log = Self {
            path,
            max_size,
            file,
            len,
        };
        log.enforce_limit()?;
        Ok(log)
    }

    fn reopen_if_removed(&mut self) -> io::Result<()> {
        if !self.path.exists() {
            self.file = open_append(&self.path)?;
            self.len = 0;
        }
        Ok(())
    }

    fn enforce_limit(&mut self) -> io::Result<()> {
        if self.max_size == 0 || self.len <= self.max_size {
            return Ok(());
        }

        let contents = fs::read(&self.path)?;
        fs::write(&self.path, recent_half(&contents))?;
        self.file = open_append(&self.path)?;
        self.len = self.file.metadata()?.len();
        Ok(())
    }
}

impl Write for BoundedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reopen_if_removed()?;
        let written = self.file.write(buf)?;
        self.len += written as u64;
        self.enforce_limit()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// The second half of `contents`, starting at a line boundary when there is one.
fn recent_half(contents: &[u8]) -> &[u8] {
    let half = contents.len() / 2;
    let start = contents[half..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(half, |pos| half + pos + 1);
    &contents[start..]
}

/// Install the global logger: stderr always, plus `log_file` when given.
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>, max_size: u64) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("bomana")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = log_file {
        match BoundedLogFile::open(path.to_path_buf(), max_size) {
            Ok(writer) => loggers.push(WriteLogger::new(level, config, writer)),
            Err(error) => eprintln!("Cannot open log file {}: {error}", path.display()),
        }
    }

    let _ = CombinedLogger::init(loggers);

    if let Some(path) = log_file {
        log::info!("Logging to {} (max {max_size} bytes)", path.display());
    }
}
