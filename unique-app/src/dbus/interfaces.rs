use crate::CommandLineSession;
use crate::Dispatcher;
use crate::Error;
use std::sync::Arc;
use zbus::interface;

/// Exported by the primary instance at the application id's object path
pub(crate) struct PrimaryObject {
    dispatcher: Dispatcher,
}

impl PrimaryObject {
    pub(crate) fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[interface(name = "io.github.UniqueApp.Application")]
impl PrimaryObject {
    fn activate(&self, platform_data: Vec<u8>) -> zbus::fdo::Result<()> {
        self.dispatcher
            .activate(&platform_data)
            .map_err(invalid_args)
    }

    fn open(
        &self,
        uris: Vec<String>,
        hint: String,
        platform_data: Vec<u8>,
    ) -> zbus::fdo::Result<()> {
        self.dispatcher
            .open(&uris, &hint, &platform_data)
            .map_err(invalid_args)
    }

    fn command_line(
        &self,
        service_name: String,
        arguments: Vec<Vec<u8>>,
        platform_data: Vec<u8>,
    ) -> zbus::fdo::Result<()> {
        self.dispatcher
            .command_line(&service_name, arguments, &platform_data)
            .map_err(invalid_args)
    }
}

/// Exported by a secondary instance for the duration of one forwarded
/// command line
pub(crate) struct SinkObject {
    session: Arc<CommandLineSession>,
}

impl SinkObject {
    pub(crate) fn new(session: Arc<CommandLineSession>) -> Self {
        Self { session }
    }
}

#[interface(name = "io.github.UniqueApp.CommandLine")]
impl SinkObject {
    fn print(&self, text: String) {
        self.session.print(&text);
    }

    fn print_error(&self, text: String) {
        self.session.print_error(&text);
    }

    fn set_exit_status(&self, status: i32) {
        self.session.set_exit_status(status);
    }
}

fn invalid_args(e: Error) -> zbus::fdo::Error {
    zbus::fdo::Error::InvalidArgs(e.to_string())
}
