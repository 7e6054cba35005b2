use crate::Application;
use crate::CommandLine;
use crate::EmitHooks;
use crate::Error;
use crate::FORWARD_FAILED_STATUS;
use crate::FileRef;
use crate::Namespace;
use crate::PlatformData;
use log::trace;
use log::warn;
use std::fmt;
use std::sync::Arc;

/// A call forwarded by a secondary instance, waiting to run on the primary's
/// event loop
pub enum ForwardedCall {
    Activate {
        platform_data: PlatformData,
    },
    Open {
        files: Vec<FileRef>,
        hint: String,
        platform_data: PlatformData,
    },
    CommandLine(PendingCommandLine),
}

/// Forwarded command line whose sink has not been connected yet
///
/// Dropping it without running it (the event loop is gone, or the call never
/// made it into the queue) reports [`FORWARD_FAILED_STATUS`] to the invoking
/// instance, so it does not wait for its full timeout.
pub struct PendingCommandLine {
    service_name: String,
    arguments: Vec<Vec<u8>>,
    platform_data: PlatformData,
    namespace: Arc<dyn Namespace>,
    answered: bool,
}

impl PendingCommandLine {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.arguments
    }

    /// Reports [`FORWARD_FAILED_STATUS`] without running the command line,
    /// blocking until the invoking instance got it.
    pub fn reject(mut self) {
        self.answered = true;
        send_failed_status(self.namespace.as_ref(), &self.service_name);
    }

    /// Connects to the invoking instance's sink. When the sink is
    /// unreachable the command line still runs, detached.
    fn connect(&mut self) -> CommandLine {
        self.answered = true;
        let sink = match self.namespace.connect_sink(&self.service_name) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(
                    "Could not reach command line sink {}: {}",
                    self.service_name, e
                );
                None
            }
        };
        CommandLine::remote(
            std::mem::take(&mut self.arguments),
            self.platform_data.clone(),
            sink,
        )
    }
}

impl Drop for PendingCommandLine {
    fn drop(&mut self) {
        if self.answered {
            return;
        }
        warn!("Dropping unhandled command line for {}", self.service_name);

        // May be dropped on the transport thread, which must not block on a call
        let namespace = self.namespace.clone();
        let service_name = std::mem::take(&mut self.service_name);
        let spawned = std::thread::Builder::new()
            .name("unique-app-reject".to_string())
            .spawn(move || send_failed_status(namespace.as_ref(), &service_name));
        if let Err(e) = spawned {
            warn!("Failed to report dropped command line: {}", e);
        }
    }
}

fn send_failed_status(namespace: &dyn Namespace, service_name: &str) {
    let sent = namespace
        .connect_sink(service_name)
        .and_then(|sink| sink.set_exit_status(FORWARD_FAILED_STATUS));
    match sent {
        Ok(()) => trace!("Reported failure to {}", service_name),
        Err(e) => warn!("Failed to report failure to {}: {}", service_name, e),
    }
}

impl ForwardedCall {
    pub fn platform_data(&self) -> &PlatformData {
        match self {
            ForwardedCall::Activate { platform_data } => platform_data,
            ForwardedCall::Open { platform_data, .. } => platform_data,
            ForwardedCall::CommandLine(pending) => &pending.platform_data,
        }
    }

    /// Drops the call without raising it. A command line is answered with
    /// [`FORWARD_FAILED_STATUS`] before this returns.
    pub fn reject(self) {
        trace!("Rejecting forwarded {}", self.name());
        if let ForwardedCall::CommandLine(pending) = self {
            pending.reject();
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ForwardedCall::Activate { .. } => "activate",
            ForwardedCall::Open { .. } => "open",
            ForwardedCall::CommandLine(_) => "command-line",
        }
    }

    /// Raises the application event, bracketed by the emission hooks.
    ///
    /// Must be called on the event loop thread. A command line's exit status
    /// is sent back to the invoking instance before `after_emit` runs.
    pub fn run<A, H>(self, app: &mut A, hooks: &H)
    where
        A: Application + ?Sized,
        H: EmitHooks + ?Sized,
    {
        trace!("Running forwarded {}", self.name());
        match self {
            ForwardedCall::Activate { platform_data } => {
                hooks.before_emit(&platform_data);
                app.activate();
                hooks.after_emit(&platform_data);
            }
            ForwardedCall::Open {
                files,
                hint,
                platform_data,
            } => {
                hooks.before_emit(&platform_data);
                app.open(&files, &hint);
                hooks.after_emit(&platform_data);
            }
            ForwardedCall::CommandLine(mut pending) => {
                let platform_data = pending.platform_data.clone();
                hooks.before_emit(&platform_data);
                let mut command_line = pending.connect();
                drop(pending);
                let status = app.command_line(&mut command_line);
                command_line.set_exit_status(status);
                command_line.finish();
                drop(command_line);
                hooks.after_emit(&platform_data);
            }
        }
    }
}

impl fmt::Debug for ForwardedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardedCall::Activate { platform_data } => f
                .debug_struct("Activate")
                .field("platform_data", platform_data)
                .finish(),
            ForwardedCall::Open {
                files,
                hint,
                platform_data,
            } => f
                .debug_struct("Open")
                .field("files", files)
                .field("hint", hint)
                .field("platform_data", platform_data)
                .finish(),
            ForwardedCall::CommandLine(pending) => f
                .debug_struct("CommandLine")
                .field("service_name", &pending.service_name)
                .field("arguments", &pending.arguments.len())
                .field("platform_data", &pending.platform_data)
                .finish(),
        }
    }
}

/// Object exported under the primary's name
///
/// Inbound calls are decoded and handed to `post` as [`ForwardedCall`]s; the
/// application drains them on its event loop. Nothing here runs application
/// code, so the transport thread is never blocked by it.
#[derive(Clone)]
pub struct Dispatcher {
    post: Arc<dyn Fn(ForwardedCall) + Send + Sync>,
    namespace: Arc<dyn Namespace>,
}

impl Dispatcher {
    /// - `namespace`: used to reach command line sinks of invoking instances
    /// - `post`: queues a call onto the primary's event loop
    pub fn new(
        namespace: Arc<dyn Namespace>,
        post: impl Fn(ForwardedCall) + Send + Sync + 'static,
    ) -> Self {
        Self {
            post: Arc::new(post),
            namespace,
        }
    }

    pub fn activate(&self, platform_data: &[u8]) -> Result<(), Error> {
        let platform_data = decode_platform_data("activate", platform_data)?;
        trace!("Queueing activate");
        (self.post)(ForwardedCall::Activate { platform_data });
        Ok(())
    }

    pub fn open(&self, uris: &[String], hint: &str, platform_data: &[u8]) -> Result<(), Error> {
        let platform_data = decode_platform_data("open", platform_data)?;
        let files = uris
            .iter()
            .map(|uri| FileRef::for_uri(uri))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| warn!("Dropping forwarded open: {}", e))?;

        trace!("Queueing open of {} file(s), hint '{}'", files.len(), hint);
        (self.post)(ForwardedCall::Open {
            files,
            hint: hint.to_string(),
            platform_data,
        });
        Ok(())
    }

    pub fn command_line(
        &self,
        service_name: &str,
        arguments: Vec<Vec<u8>>,
        platform_data: &[u8],
    ) -> Result<(), Error> {
        let platform_data = decode_platform_data("command-line", platform_data)?;
        if service_name.is_empty() {
            warn!("Dropping forwarded command-line without a sink name");
            return Err(Error::Decode("empty command line service name".to_string()));
        }

        trace!(
            "Queueing command-line with {} argument(s), sink {}",
            arguments.len(),
            service_name
        );
        (self.post)(ForwardedCall::CommandLine(PendingCommandLine {
            service_name: service_name.to_string(),
            arguments,
            platform_data,
            namespace: self.namespace.clone(),
            answered: false,
        }));
        Ok(())
    }
}

fn decode_platform_data(call: &str, bytes: &[u8]) -> Result<PlatformData, Error> {
    PlatformData::decode(bytes).inspect_err(|e| warn!("Dropping forwarded {}: {}", call, e))
}
