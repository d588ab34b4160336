//! Byte sources of unknown length that feed uploads.

use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

use log::{debug, warn};

/// The result of reading a chunk from a [`ByteSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Number of bytes written at the beginning of the buffer.
    pub bytes_read: usize,
    /// `false` when the source is exhausted. A chunk shorter than the buffer with pending data is
    /// a short read and the reader must keep reading.
    pub more_data_pending: bool,
}

impl Chunk {
    /// A chunk of `bytes_read` bytes reporting that the source isn't exhausted.
    pub fn pending(bytes_read: usize) -> Self {
        Self {
            bytes_read,
            more_data_pending: true,
        }
    }

    /// A chunk of `bytes_read` bytes reporting that the source is exhausted.
    pub fn last(bytes_read: usize) -> Self {
        Self {
            bytes_read,
            more_data_pending: false,
        }
    }
}

/// A stream of bytes whose total length isn't known in advance.
pub trait ByteSource {
    /// Reads the next chunk into `buf`.
    ///
    /// Once a chunk reports that no more data is pending, the source must not be read again.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk>;
}

impl<B: ByteSource + ?Sized> ByteSource for &mut B {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        (**self).read_chunk(buf)
    }
}

impl<B: ByteSource + ?Sized> ByteSource for Box<B> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        (**self).read_chunk(buf)
    }
}

/// Adapts any [`Read`] into a [`ByteSource`].
///
/// Every chunk fills the buffer unless the reader reaches its end, which is the only condition
/// that exhausts the source.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    exhausted: bool,
}

impl<R: Read> ReaderSource<R> {
    /// Creates a source that reads from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            exhausted: false,
        }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        if self.exhausted {
            return Ok(Chunk::last(0));
        }

        let (bytes_read, eof) = fill(&mut self.reader, buf)?;
        self.exhausted = eof;
        Ok(Chunk {
            bytes_read,
            more_data_pending: !eof,
        })
    }
}

/// A source that streams the standard output of a child process, e.g. a database dump utility.
///
/// The source is exhausted when the process closes its output and exits successfully; a non-zero
/// exit status is a read error. Dropping the source before exhausting it kills the process.
#[derive(Debug)]
pub struct CommandSource {
    child: Child,
    stdout: Option<ChildStdout>,
    program: String,
}

impl CommandSource {
    /// Spawns `command` with its standard output piped to the source.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let program = command.get_program().to_string_lossy().into_owned();
        debug!("Spawning {}", program);

        let mut child = command.stdout(Stdio::piped()).spawn()?;
        let stdout = child.stdout.take();
        if stdout.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} has no standard output", program),
            ));
        }

        Ok(Self {
            child,
            stdout,
            program,
        })
    }
}

impl ByteSource for CommandSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(Chunk::last(0));
        };

        let (bytes_read, eof) = fill(stdout, buf)?;
        if !eof {
            return Ok(Chunk::pending(bytes_read));
        }

        self.stdout = None;
        let status = self.child.wait()?;
        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} exited with {}", self.program, status),
            ));
        }

        Ok(Chunk::last(bytes_read))
    }
}

impl Drop for CommandSource {
    fn drop(&mut self) {
        if self.stdout.take().is_none() {
            return;
        }

        warn!("{} didn't finish its output; killing it", self.program);
        // The process may have already exited; nothing else can be done at this point.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Reads into `buf` until it's full or `reader` reaches its end. It returns the number of read
/// bytes and `true` if the end was reached.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<(usize, bool)> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok((filled, true)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok((filled, false))
}
