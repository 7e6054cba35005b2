use crate::AppId;
use crate::Dispatcher;
use crate::Error;
use crate::FileRef;
use crate::ForwardedCall;
use crate::NameGuard;
use crate::Namespace;
use crate::PlatformData;
use crate::PrimaryService;
use crate::Registration;
use crate::RemotePrimary;
use crate::command_line::os_to_bytes;
use crate::registration;
use log::debug;
use log::error;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Exit status reported when a command line could not be forwarded
pub const FORWARD_FAILED_STATUS: i32 = 1;

pub const DEFAULT_COMMAND_LINE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ApplicationOptions {
    /// Never become the primary instance, only forward to an existing one
    pub is_launcher: bool,

    /// Upper bound on waiting for a forwarded command line's exit status
    pub command_line_timeout: Duration,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            is_launcher: false,
            command_line_timeout: DEFAULT_COMMAND_LINE_TIMEOUT,
        }
    }
}

enum Role {
    Primary(NameGuard),
    Secondary(RemotePrimary),
}

/// Registration state of one application instance
///
/// Created by [`ApplicationImpl::register`]; either owns the application id
/// (primary) or holds a handle to the instance that does (secondary).
/// [`destroy`] releases that state and may be called any number of times.
///
/// [`destroy`]: ApplicationImpl::destroy
pub struct ApplicationImpl {
    app_id: AppId,
    options: ApplicationOptions,
    role: Option<Role>,
}

impl ApplicationImpl {
    /// Registers the application id in `namespace`.
    ///
    /// - `post`: queues forwarded calls onto this instance's event loop; only
    ///   used when this instance becomes the primary.
    pub fn register(
        namespace: Arc<dyn Namespace>,
        app_id: AppId,
        options: ApplicationOptions,
        post: impl Fn(ForwardedCall) + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        let mut this = Self {
            app_id,
            options,
            role: None,
        };

        if this.options.is_launcher {
            let service = registration::resolve(namespace.as_ref(), &this.app_id)?;
            this.become_secondary(service, namespace);
            return Ok(this);
        }

        let dispatcher = Dispatcher::new(namespace.clone(), post);
        match registration::register(namespace.as_ref(), &this.app_id, dispatcher)? {
            Registration::Won(guard) => {
                debug!("{} is the primary instance", this.app_id);
                this.role = Some(Role::Primary(guard));
            }
            Registration::Lost(service) => this.become_secondary(service, namespace),
        }
        Ok(this)
    }

    fn become_secondary(
        &mut self,
        service: Box<dyn PrimaryService>,
        namespace: Arc<dyn Namespace>,
    ) {
        debug!("{} is a secondary instance", self.app_id);
        let remote = RemotePrimary::new(self.app_id.clone(), service, namespace);
        self.role = Some(Role::Secondary(remote));
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn options(&self) -> &ApplicationOptions {
        &self.options
    }

    /// True while this instance forwards to another one
    pub fn is_remote(&self) -> bool {
        matches!(self.role, Some(Role::Secondary(_)))
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.role, Some(Role::Primary(_)))
    }

    fn remote(&self) -> Result<&RemotePrimary, Error> {
        match &self.role {
            Some(Role::Secondary(remote)) => Ok(remote),
            _ => Err(Error::NotRemote),
        }
    }

    pub fn activate(&self, platform_data: &PlatformData) -> Result<(), Error> {
        self.remote()?.activate(platform_data)
    }

    pub fn open(
        &self,
        files: &[FileRef],
        hint: &str,
        platform_data: &PlatformData,
    ) -> Result<(), Error> {
        self.remote()?.open(files, hint, platform_data)
    }

    /// Forwards the command line and returns the primary's exit status.
    ///
    /// Any failure (no sink, dropped connection, timeout) is logged and
    /// reported as [`FORWARD_FAILED_STATUS`].
    pub fn command_line<I, S>(&self, arguments: I, platform_data: &PlatformData) -> i32
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let arguments: Vec<Vec<u8>> = arguments
            .into_iter()
            .map(|arg| os_to_bytes(arg.as_ref()))
            .collect();

        let result = self.remote().and_then(|remote| {
            remote.command_line(
                arguments,
                platform_data,
                self.options.command_line_timeout,
            )
        });

        match result {
            Ok(status) => status,
            Err(e) => {
                error!("Failed to forward command line to {}: {}", self.app_id, e);
                FORWARD_FAILED_STATUS
            }
        }
    }

    /// Accepted but not forwarded: remote action groups are not supported.
    pub fn change_action_state(
        &self,
        action_name: &str,
        _value: &PlatformData,
        _platform_data: &PlatformData,
    ) -> Result<(), Error> {
        self.remote()?;
        debug!("Not forwarding state change of action '{}'", action_name);
        Ok(())
    }

    /// Accepted but not forwarded: remote action groups are not supported.
    pub fn activate_action(
        &self,
        action_name: &str,
        _parameter: Option<&PlatformData>,
        _platform_data: &PlatformData,
    ) -> Result<(), Error> {
        self.remote()?;
        debug!("Not forwarding activation of action '{}'", action_name);
        Ok(())
    }

    /// Forwarded calls are delivered before they return, nothing is buffered.
    pub fn flush(&self) {}

    /// Releases the registration: unregisters the name if primary, drops the
    /// handle to the primary if secondary. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        match self.role.take() {
            Some(Role::Primary(mut guard)) => {
                debug!("Unregistering primary instance of {}", self.app_id);
                guard.release();
            }
            Some(Role::Secondary(_)) => {
                debug!("Detaching from primary instance of {}", self.app_id);
            }
            None => {}
        }
    }
}

impl Drop for ApplicationImpl {
    fn drop(&mut self) {
        self.destroy();
    }
}
