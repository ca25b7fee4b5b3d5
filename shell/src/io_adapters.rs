//! Output plumbing shared by built-in and external commands.
//!
//! Every command writes into a [`FanOut`] per stream. A fan-out forwards
//! each write to all of its destinations: the truncated file, the appended
//! file, or the console when neither file is set.

use crate::redirect::{RedirectionTargets, Stream};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Result as IoResult, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Memory-backed writer standing in for the console.
///
/// Clones share the same buffer, so a caller keeps one handle and reads the
/// collected bytes after the command has finished.
#[derive(Debug, Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// Where console output goes when a stream is not redirected.
#[derive(Debug, Clone, Default)]
pub enum Console {
    /// The process' own stdout and stderr.
    #[default]
    Terminal,
    /// In-memory buffers, one per stream.
    Captured { stdout: MemWriter, stderr: MemWriter },
}

impl Console {
    /// A captured console with fresh buffers.
    pub fn captured() -> Self {
        Console::Captured {
            stdout: MemWriter::new(),
            stderr: MemWriter::new(),
        }
    }

    fn destination(&self, stream: Stream) -> Destination {
        match (self, stream) {
            (Console::Terminal, stream) => Destination::Terminal(stream),
            (Console::Captured { stdout, .. }, Stream::Stdout) => Destination::Memory(stdout.clone()),
            (Console::Captured { stderr, .. }, Stream::Stderr) => Destination::Memory(stderr.clone()),
        }
    }

    /// Write a diagnostic line straight to the console's error stream.
    pub fn report(&self, message: impl std::fmt::Display) {
        let mut sink = FanOut::console(self, Stream::Stderr);
        let _ = writeln!(sink, "{message}");
        if sink.take_error().is_some() {
            eprintln!("{message}");
        }
    }
}

enum Destination {
    File(File),
    Terminal(Stream),
    Memory(MemWriter),
}

impl Destination {
    fn write_all(&mut self, data: &[u8]) -> IoResult<()> {
        match self {
            Destination::File(f) => f.write_all(data),
            Destination::Terminal(Stream::Stdout) => io::stdout().lock().write_all(data),
            Destination::Terminal(Stream::Stderr) => io::stderr().lock().write_all(data),
            Destination::Memory(m) => m.write_all(data),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            Destination::File(f) => f.flush(),
            Destination::Terminal(Stream::Stdout) => io::stdout().flush(),
            Destination::Terminal(Stream::Stderr) => io::stderr().flush(),
            Destination::Memory(m) => m.flush(),
        }
    }
}

/// A writer that duplicates every write to a set of destinations.
///
/// A destination that fails is dropped and the remaining ones keep
/// receiving bytes. Writes themselves never fail; the first error is kept
/// until [`FanOut::take_error`] collects it.
pub struct FanOut {
    stream: Stream,
    destinations: Vec<Destination>,
    error: Option<io::Error>,
}

impl FanOut {
    /// A sink writing only to the console.
    pub fn console(console: &Console, stream: Stream) -> Self {
        FanOut {
            stream,
            destinations: vec![console.destination(stream)],
            error: None,
        }
    }

    /// Open every destination of `stream` named by `targets`.
    ///
    /// Files are created (and truncated, for `>`) right away, whether or not
    /// anything is later written. Relative paths are taken from `cwd`. With no
    /// file destination the sink falls back to the console.
    pub fn open(stream: Stream, targets: &RedirectionTargets, cwd: &Path, console: &Console) -> Result<Self> {
        let (truncate, append) = targets.for_stream(stream);
        let mut destinations = Vec::with_capacity(2);

        if let Some(path) = truncate {
            let path = cwd.join(path);
            let file = File::create(&path).with_context(|| format!("{}: cannot create file", path.display()))?;
            destinations.push(Destination::File(file));
        }
        if let Some(path) = append {
            let path = cwd.join(path);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("{}: cannot open file for appending", path.display()))?;
            destinations.push(Destination::File(file));
        }
        if destinations.is_empty() {
            destinations.push(console.destination(stream));
        }

        Ok(FanOut {
            stream,
            destinations,
            error: None,
        })
    }

    /// True when the only destination is the real terminal, so a child
    /// process may inherit the stream instead of going through a pipe.
    pub fn is_terminal(&self) -> bool {
        matches!(self.destinations.as_slice(), [Destination::Terminal(_)])
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// The first failure of any destination since the last call.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn for_each_destination(&mut self, mut op: impl FnMut(&mut Destination) -> IoResult<()>) {
        let error = &mut self.error;
        self.destinations.retain_mut(|destination| match op(destination) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("output destination dropped: {e}");
                error.get_or_insert(e);
                false
            }
        });
    }
}

impl Write for FanOut {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.for_each_destination(|destination| destination.write_all(data));
        if self.destinations.is_empty() && !data.is_empty() {
            // every destination is gone, so the bytes went nowhere
            self.error.get_or_insert_with(|| io::ErrorKind::BrokenPipe.into());
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.for_each_destination(Destination::flush);
        Ok(())
    }
}

/// The pair of sinks a command writes into.
pub struct Sinks {
    pub stdout: FanOut,
    pub stderr: FanOut,
}

impl Sinks {
    /// Both streams on the console, no redirection.
    pub fn console(console: &Console) -> Self {
        Sinks {
            stdout: FanOut::console(console, Stream::Stdout),
            stderr: FanOut::console(console, Stream::Stderr),
        }
    }
}

/// What is left after a drain finished: the sink, handed back for
/// diagnostics, and the first error of any of its destinations.
pub struct Drained {
    pub sink: FanOut,
    pub bytes: u64,
    pub write_error: Option<io::Error>,
}

/// Copy `source` into `sink` until end of stream.
///
/// A failing destination does not stop the copy: the source keeps being
/// read so the producer never blocks on a full pipe, and the healthy
/// destinations still get every byte.
pub fn drain(mut source: impl Read, mut sink: FanOut) -> Drained {
    let mut buf = [0u8; 8192];
    let mut bytes = 0u64;

    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("drain: reading {:?} failed: {e}", sink.stream());
                break;
            }
        };
        bytes += n as u64;
        let _ = sink.write_all(&buf[..n]);
    }
    let _ = sink.flush();

    let write_error = sink.take_error();
    Drained {
        sink,
        bytes,
        write_error,
    }
}
