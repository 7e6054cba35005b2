use crate::AppId;
use crate::CommandLineSession;
use crate::Error;
use crate::FileRef;
use crate::Namespace;
use crate::PlatformData;
use crate::PrimaryService;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

/// Correlation token for a command line sink name, unique per process and
/// call.
fn session_token() -> String {
    format!(
        "p{}x{}",
        std::process::id(),
        NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
    )
}

/// The primary instance, as seen from a secondary instance
pub struct RemotePrimary {
    app_id: AppId,
    service: Box<dyn PrimaryService>,
    namespace: Arc<dyn Namespace>,
}

impl RemotePrimary {
    pub fn new(
        app_id: AppId,
        service: Box<dyn PrimaryService>,
        namespace: Arc<dyn Namespace>,
    ) -> Self {
        Self {
            app_id,
            service,
            namespace,
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn activate(&self, platform_data: &PlatformData) -> Result<(), Error> {
        debug!("Activating primary instance of {}", self.app_id);
        self.service.activate(platform_data)
    }

    pub fn open(
        &self,
        files: &[FileRef],
        hint: &str,
        platform_data: &PlatformData,
    ) -> Result<(), Error> {
        let uris: Vec<String> = files.iter().map(|file| file.uri().to_string()).collect();
        debug!(
            "Opening {} file(s) in primary instance of {}",
            uris.len(),
            self.app_id
        );
        self.service.open(&uris, hint, platform_data)
    }

    /// Forwards a command line and blocks until the primary reports its exit
    /// status, at most `timeout`. Output is written to this process's stdout
    /// and stderr.
    pub fn command_line(
        &self,
        arguments: Vec<Vec<u8>>,
        platform_data: &PlatformData,
        timeout: Duration,
    ) -> Result<i32, Error> {
        let session = Arc::new(CommandLineSession::new());
        self.command_line_with_session(arguments, platform_data, session, timeout)
    }

    pub fn command_line_with_session(
        &self,
        arguments: Vec<Vec<u8>>,
        platform_data: &PlatformData,
        session: Arc<CommandLineSession>,
        timeout: Duration,
    ) -> Result<i32, Error> {
        let service_name = self.app_id.command_line_name(&session_token());

        // Unexported again when the guard drops, after the status is read
        let _sink = self.namespace.export_sink(&service_name, session.clone())?;

        debug!(
            "Forwarding command line with {} argument(s), sink {}",
            arguments.len(),
            service_name
        );
        self.service
            .command_line(&service_name, &arguments, platform_data)?;

        let status = session.wait(timeout)?;
        debug!("Primary instance finished command line with {}", status);
        Ok(status)
    }
}
