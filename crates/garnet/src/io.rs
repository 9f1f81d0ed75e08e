use std::{
    any::Any,
    borrow::Cow,
    fmt,
    io::{self, Write as _},
};

use crate::exception::{ExcType, RunResult};

/// Destination of `puts`, `print`, `p` and writes to `STDOUT`/`STDERR`.
///
/// Implement this trait to capture or redirect output. Writers never add separators or
/// newlines on their own; the caller pushes them with [`PrintWriter::stdout_push`].
pub trait PrintWriter: Any + fmt::Debug {
    /// Writes already-formatted text to standard output.
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()>;

    /// Writes one character to standard output, used for newlines.
    fn stdout_push(&mut self, end: char) -> RunResult<()>;

    /// Writes to standard error. Defaults to the process stderr.
    fn stderr_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        io::stderr()
            .write_all(output.as_bytes())
            .map_err(|err| ExcType::RuntimeError.error(format!("stderr: {err}")))
    }
}

/// Buffers output and writes it to the process stdout on flush or drop.
#[derive(Debug, Default)]
pub struct StdPrint {
    buffer: String,
}

impl StdPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        stdout.write_all(self.buffer.as_bytes())?;
        stdout.flush()?;
        self.buffer.clear();
        Ok(())
    }
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.buffer.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        self.buffer.push(end);
        if end == '\n' && self.buffer.len() > 8 * 1024 {
            self.flush()
                .map_err(|err| ExcType::RuntimeError.error(format!("stdout: {err}")))?;
        }
        Ok(())
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Collects stdout (and, separately, stderr) into strings.
///
/// Useful for testing or capturing output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint {
    stdout: String,
    stderr: String,
}

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected standard output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.stdout
    }

    #[must_use]
    pub fn error_output(&self) -> &str {
        &self.stderr
    }

    /// Takes the collected standard output, leaving the buffer empty.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.stdout)
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.stdout.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        self.stdout.push(end);
        Ok(())
    }

    fn stderr_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.stderr.push_str(&output);
        Ok(())
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> RunResult<()> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> RunResult<()> {
        Ok(())
    }

    fn stderr_write(&mut self, _output: Cow<'_, str>) -> RunResult<()> {
        Ok(())
    }
}
