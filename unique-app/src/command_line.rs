use crate::CommandLineSink;
use crate::Error;
use crate::PlatformData;
use log::debug;
use log::warn;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

#[derive(Debug, Default)]
struct ExitSlot {
    status: i32,
    completed: bool,
}

/// Secondary-side state of one forwarded command line
///
/// The primary drives it through the exported sink: output is written to the
/// session's stdout/stderr writers and `set_exit_status` wakes the thread
/// blocked in [`CommandLineSession::wait`].
pub struct CommandLineSession {
    slot: Mutex<ExitSlot>,
    completed: Condvar,
    stdout: Mutex<Box<dyn Write + Send>>,
    stderr: Mutex<Box<dyn Write + Send>>,
}

impl CommandLineSession {
    /// Session writing to this process's stdout and stderr
    pub fn new() -> Self {
        Self::with_output(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn with_output(stdout: Box<dyn Write + Send>, stderr: Box<dyn Write + Send>) -> Self {
        Self {
            slot: Mutex::new(ExitSlot::default()),
            completed: Condvar::new(),
            stdout: Mutex::new(stdout),
            stderr: Mutex::new(stderr),
        }
    }

    pub fn print(&self, text: &str) {
        let mut out = self.stdout.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            warn!("Failed to write forwarded output: {}", e);
        }
    }

    pub fn print_error(&self, text: &str) {
        let mut err = self.stderr.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = err.write_all(text.as_bytes()).and_then(|_| err.flush()) {
            warn!("Failed to write forwarded error output: {}", e);
        }
    }

    /// Records the exit status and wakes the waiter. Only the first status
    /// counts.
    pub fn set_exit_status(&self, status: i32) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.completed {
            warn!(
                "Ignoring exit status {}, session already completed with {}",
                status, slot.status
            );
            return;
        }
        slot.status = status;
        slot.completed = true;
        self.completed.notify_all();
    }

    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
    }

    /// Blocks until the exit status arrives or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<i32, Error> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .completed
            .wait_timeout_while(slot, timeout, |slot| !slot.completed)
            .unwrap_or_else(PoisonError::into_inner);

        if slot.completed {
            Ok(slot.status)
        } else {
            Err(Error::SessionTimeout(timeout))
        }
    }
}

impl Default for CommandLineSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandLineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CommandLineSession")
            .field("status", &slot.status)
            .field("completed", &slot.completed)
            .finish()
    }
}

impl CommandLineSink for CommandLineSession {
    fn print(&self, text: &str) -> Result<(), Error> {
        CommandLineSession::print(self, text);
        Ok(())
    }

    fn print_error(&self, text: &str) -> Result<(), Error> {
        CommandLineSession::print_error(self, text);
        Ok(())
    }

    fn set_exit_status(&self, status: i32) -> Result<(), Error> {
        CommandLineSession::set_exit_status(self, status);
        Ok(())
    }
}

enum Output {
    /// The primary's own invocation
    Local,
    Remote(Box<dyn CommandLineSink>),
    /// The sink could not be reached, output is only logged
    Detached,
}

/// A command line being handled by the primary instance
///
/// For forwarded invocations the output and the final exit status go back
/// to the invoking instance. The status is sent once, by [`finish`] or on
/// drop, and the remote sink is released right after.
///
/// [`finish`]: CommandLine::finish
pub struct CommandLine {
    arguments: Vec<Vec<u8>>,
    platform_data: PlatformData,
    exit_status: i32,
    output: Output,
    finished: bool,
}

impl CommandLine {
    /// Command line of the primary instance itself
    pub fn local(arguments: Vec<Vec<u8>>, platform_data: PlatformData) -> Self {
        Self::with_output(arguments, platform_data, Output::Local)
    }

    pub(crate) fn remote(
        arguments: Vec<Vec<u8>>,
        platform_data: PlatformData,
        sink: Option<Box<dyn CommandLineSink>>,
    ) -> Self {
        let output = match sink {
            Some(sink) => Output::Remote(sink),
            None => Output::Detached,
        };
        Self::with_output(arguments, platform_data, output)
    }

    fn with_output(arguments: Vec<Vec<u8>>, platform_data: PlatformData, output: Output) -> Self {
        Self {
            arguments,
            platform_data,
            exit_status: 0,
            output,
            finished: false,
        }
    }

    /// Arguments exactly as the invoking process received them
    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.arguments
    }

    pub fn arguments_os(&self) -> Vec<OsString> {
        self.arguments.iter().map(|arg| bytes_to_os(arg)).collect()
    }

    pub fn arguments_lossy(&self) -> Vec<String> {
        self.arguments
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect()
    }

    pub fn platform_data(&self) -> &PlatformData {
        &self.platform_data
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self.output, Output::Local)
    }

    pub fn print(&self, text: &str) {
        match &self.output {
            Output::Local => print!("{}", text),
            Output::Remote(sink) => {
                if let Err(e) = sink.print(text) {
                    warn!("Failed to forward output: {}", e);
                }
            }
            Output::Detached => debug!("Dropping output of detached command line: {}", text),
        }
    }

    pub fn print_error(&self, text: &str) {
        match &self.output {
            Output::Local => eprint!("{}", text),
            Output::Remote(sink) => {
                if let Err(e) = sink.print_error(text) {
                    warn!("Failed to forward error output: {}", e);
                }
            }
            Output::Detached => debug!("Dropping error output of detached command line: {}", text),
        }
    }

    pub fn set_exit_status(&mut self, status: i32) {
        self.exit_status = status;
    }

    pub fn exit_status(&self) -> i32 {
        self.exit_status
    }

    /// Sends the exit status to the invoking instance and releases the sink.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Output::Remote(sink) = std::mem::replace(&mut self.output, Output::Detached) {
            debug!("Forwarding exit status {}", self.exit_status);
            if let Err(e) = sink.set_exit_status(self.exit_status) {
                warn!("Failed to forward exit status {}: {}", self.exit_status, e);
            }
        }
    }
}

impl Drop for CommandLine {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLine")
            .field("arguments", &self.arguments_lossy())
            .field("exit_status", &self.exit_status)
            .field("remote", &self.is_remote())
            .finish()
    }
}

/// Argument bytes without any terminator, the length is authoritative
#[cfg(unix)]
pub(crate) fn os_to_bytes(arg: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    arg.as_bytes().to_vec()
}

#[cfg(not(unix))]
pub(crate) fn os_to_bytes(arg: &std::ffi::OsStr) -> Vec<u8> {
    arg.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn bytes_to_os(arg: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(arg.to_vec())
}

#[cfg(not(unix))]
fn bytes_to_os(arg: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(arg).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn wait_returns_status_set_from_another_thread() {
        let session = Arc::new(CommandLineSession::new());
        let s = session.clone();
        let signaller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            s.set_exit_status(3);
        });

        assert_eq!(session.wait(Duration::from_secs(5)).unwrap(), 3);
        signaller.join().unwrap();
    }

    #[test]
    fn wait_returns_immediately_when_already_completed() {
        let session = CommandLineSession::new();
        session.set_exit_status(0);
        assert_eq!(session.wait(Duration::from_millis(1)).unwrap(), 0);
    }

    #[test]
    fn wait_times_out_without_a_status() {
        let session = CommandLineSession::new();
        let started = Instant::now();
        let result = session.wait(Duration::from_millis(100));
        assert!(matches!(result, Err(Error::SessionTimeout(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!session.is_completed());
    }

    #[test]
    fn first_exit_status_wins() {
        let session = CommandLineSession::new();
        session.set_exit_status(4);
        session.set_exit_status(9);
        assert_eq!(session.wait(Duration::from_millis(1)).unwrap(), 4);
    }

    #[test]
    fn session_writes_to_its_output() {
        let out = Captured::default();
        let err = Captured::default();
        let session = CommandLineSession::with_output(Box::new(out.clone()), Box::new(err.clone()));

        session.print("hello ");
        session.print("world\n");
        session.print_error("oops\n");

        assert_eq!(out.text(), "hello world\n");
        assert_eq!(err.text(), "oops\n");
    }

    #[test]
    fn command_line_forwards_status_once_on_drop() {
        let session = Arc::new(CommandLineSession::new());
        let sink: Box<dyn CommandLineSink> = Box::new(SharedSink(session.clone()));

        let mut cmdline = CommandLine::remote(
            vec![b"prog".to_vec()],
            PlatformData::empty(),
            Some(sink),
        );
        cmdline.set_exit_status(7);
        assert!(!session.is_completed());
        drop(cmdline);

        assert_eq!(session.wait(Duration::from_millis(1)).unwrap(), 7);
    }

    #[test]
    fn finish_is_idempotent() {
        let session = Arc::new(CommandLineSession::new());
        let sink: Box<dyn CommandLineSink> = Box::new(SharedSink(session.clone()));

        let mut cmdline = CommandLine::remote(vec![], PlatformData::empty(), Some(sink));
        cmdline.set_exit_status(2);
        cmdline.finish();
        cmdline.set_exit_status(5);
        cmdline.finish();
        drop(cmdline);

        assert_eq!(session.wait(Duration::from_millis(1)).unwrap(), 2);
    }

    #[test]
    fn arguments_keep_raw_bytes() {
        let cmdline = CommandLine::local(
            vec![b"prog".to_vec(), vec![b'a', 0xff, b'b']],
            PlatformData::empty(),
        );
        assert_eq!(cmdline.arguments()[1], vec![b'a', 0xff, b'b']);
        assert_eq!(cmdline.arguments_lossy()[1], "a\u{fffd}b");
        assert!(!cmdline.is_remote());
        #[cfg(unix)]
        assert_eq!(os_to_bytes(&cmdline.arguments_os()[1]), vec![b'a', 0xff, b'b']);
    }

    struct SharedSink(Arc<CommandLineSession>);

    impl CommandLineSink for SharedSink {
        fn print(&self, text: &str) -> Result<(), Error> {
            self.0.print(text);
            Ok(())
        }

        fn print_error(&self, text: &str) -> Result<(), Error> {
            self.0.print_error(text);
            Ok(())
        }

        fn set_exit_status(&self, status: i32) -> Result<(), Error> {
            self.0.set_exit_status(status);
            Ok(())
        }
    }
}
