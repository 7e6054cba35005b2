use crate::AppId;
use crate::CommandLine;
use crate::CommandLineSession;
use crate::Dispatcher;
use crate::Error;
use crate::FileRef;
use crate::NameGuard;
use crate::PlatformData;
use log::warn;
use std::sync::Arc;

/// Application events raised on the primary instance's event loop thread.
pub trait Application {
    fn activate(&mut self) {
        warn!("Application does not handle activation");
    }

    fn open(&mut self, files: &[FileRef], hint: &str) {
        warn!(
            "Application does not handle opening {} file(s) (hint '{}')",
            files.len(),
            hint
        );
    }

    /// Handles a command line, the returned value is the exit status of the
    /// invoking instance.
    fn command_line(&mut self, command_line: &mut CommandLine) -> i32 {
        warn!(
            "Application does not handle command lines ({} arguments)",
            command_line.arguments().len()
        );
        1
    }
}

/// Brackets every forwarded event, e.g. to apply startup notification data
/// before emission and clean it up after.
pub trait EmitHooks {
    fn before_emit(&self, _platform_data: &PlatformData) {}

    fn after_emit(&self, _platform_data: &PlatformData) {}
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl EmitHooks for NoHooks {}

/// Handle to the primary instance, as seen by a secondary instance.
///
/// Every call returns once the primary has queued the call, not when it has
/// been handled.
pub trait PrimaryService: Send + Sync {
    fn activate(&self, platform_data: &PlatformData) -> Result<(), Error>;

    fn open(
        &self,
        uris: &[String],
        hint: &str,
        platform_data: &PlatformData,
    ) -> Result<(), Error>;

    fn command_line(
        &self,
        service_name: &str,
        arguments: &[Vec<u8>],
        platform_data: &PlatformData,
    ) -> Result<(), Error>;
}

/// Handle to a secondary instance's command-line sink, as seen by the
/// primary.
pub trait CommandLineSink: Send {
    fn print(&self, text: &str) -> Result<(), Error>;

    fn print_error(&self, text: &str) -> Result<(), Error>;

    fn set_exit_status(&self, status: i32) -> Result<(), Error>;
}

/// Outcome of trying to claim a name
#[derive(Debug)]
pub enum Claim {
    Won(NameGuard),
    Taken,
}

/// Process-wide registration namespace
///
/// Implemented by [`crate::dbus::DBusNamespace`] (the session bus) and
/// [`crate::local::LocalNamespace`] (in-process).
pub trait Namespace: Send + Sync {
    /// Atomically claims the application id and exports `dispatcher` under
    /// it. Two racing claims never both win.
    fn claim(&self, app_id: &AppId, dispatcher: Dispatcher) -> Result<Claim, Error>;

    /// Returns a handle to the current owner of the application id, or
    /// [`Error::Resolution`] if nobody owns it.
    fn resolve(&self, app_id: &AppId) -> Result<Box<dyn PrimaryService>, Error>;

    /// Claims `service_name` and exports `session` under it.
    fn export_sink(
        &self,
        service_name: &str,
        session: Arc<CommandLineSession>,
    ) -> Result<NameGuard, Error>;

    fn connect_sink(&self, service_name: &str) -> Result<Box<dyn CommandLineSink>, Error>;
}
