//! Session bus backend
//!
//! The application id is claimed as a well-known bus name with
//! `DO_NOT_QUEUE`, so the bus daemon decides atomically which instance is the
//! primary. Inbound calls are served by the zbus connection's executor
//! thread, which only decodes them and posts them to the application.

mod interfaces;

use crate::AppId;
use crate::Claim;
use crate::CommandLineSession;
use crate::CommandLineSink;
use crate::Dispatcher;
use crate::Error;
use crate::NameGuard;
use crate::Namespace;
use crate::PlatformData;
use crate::PrimaryService;
use crate::app_id::object_path_for;
use futures::executor::block_on;
use futures::future::Either;
use futures::future::select;
use interfaces::PrimaryObject;
use interfaces::SinkObject;
use log::debug;
use log::trace;
use log::warn;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use zbus::Connection;
use zbus::fdo::DBusProxy;
use zbus::fdo::RequestNameFlags;
use zbus::fdo::RequestNameReply;
use zbus::names::BusName;
use zbus::names::WellKnownName;
use zbus::object_server::Interface;
use zbus::zvariant::DynamicType;

pub const PRIMARY_INTERFACE: &str = "io.github.UniqueApp.Application";
pub const COMMAND_LINE_INTERFACE: &str = "io.github.UniqueApp.CommandLine";

/// Bound on every method call, so a peer that stopped answering can not
/// block the caller forever
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Clone)]
pub struct DBusNamespace {
    connection: Connection,
    call_timeout: Duration,
}

impl DBusNamespace {
    /// Connects to the session bus
    pub fn session() -> Result<Self, Error> {
        let connection = block_on(Connection::session())?;
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self {
            connection,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn call<T>(&self, fut: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        block_on(with_timeout(fut, self.call_timeout))
    }

    /// Exports `object` at `path`, then requests `name`. Returns `None` if
    /// the name is owned by someone else, the object is unexported again in
    /// that case.
    fn export<I: Interface>(
        &self,
        name: &str,
        path: &str,
        object: I,
    ) -> Result<Option<NameGuard>, Error> {
        let registration_error = |reason: String| Error::Registration {
            name: name.to_string(),
            reason,
        };
        let well_known = WellKnownName::try_from(name.to_string())
            .map_err(|e| registration_error(e.to_string()))?;

        let server = self.connection.object_server();
        let acquired = self.call(async {
            if !server.at(path, object).await? {
                return Err(registration_error(format!(
                    "object path {} is already exported",
                    path
                )));
            }

            let reply = DBusProxy::new(&self.connection)
                .await?
                .request_name(well_known.clone(), RequestNameFlags::DoNotQueue.into())
                .await;

            match reply {
                Ok(RequestNameReply::PrimaryOwner) | Ok(RequestNameReply::AlreadyOwner) => {
                    Ok(true)
                }
                Ok(RequestNameReply::Exists) => {
                    server.remove::<I, _>(path).await?;
                    Ok(false)
                }
                Ok(other) => {
                    server.remove::<I, _>(path).await?;
                    Err(registration_error(format!(
                        "unexpected reply when requesting name: {:?}",
                        other
                    )))
                }
                Err(e) => {
                    server.remove::<I, _>(path).await?;
                    Err(registration_error(e.to_string()))
                }
            }
        })?;

        if !acquired {
            debug!("{} is already owned", name);
            return Ok(None);
        }

        debug!("Acquired {}, serving {}", name, path);
        let connection = self.connection.clone();
        let owned_name = name.to_string();
        let owned_path = path.to_string();
        let call_timeout = self.call_timeout;
        Ok(Some(NameGuard::new(name, move || {
            let released = block_on(with_timeout(
                async {
                    DBusProxy::new(&connection)
                        .await?
                        .release_name(well_known)
                        .await?;
                    connection
                        .object_server()
                        .remove::<I, _>(owned_path.as_str())
                        .await?;
                    Ok(())
                },
                call_timeout,
            ));
            if let Err(e) = released {
                warn!("Failed to release {}: {}", owned_name, e);
            }
        })))
    }

    /// Proxy to an object behind `name`, which must currently have an owner
    fn proxy(
        &self,
        name: &str,
        path: String,
        interface: &'static str,
    ) -> Result<zbus::Proxy<'static>, Error> {
        let bus_name =
            BusName::try_from(name).map_err(|_| Error::Resolution(name.to_string()))?;

        self.call(async {
            match DBusProxy::new(&self.connection)
                .await?
                .get_name_owner(bus_name)
                .await
            {
                Ok(owner) => trace!("{} is owned by {}", name, owner),
                Err(zbus::fdo::Error::NameHasNoOwner(_)) => {
                    return Err(Error::Resolution(name.to_string()));
                }
                Err(e) => return Err(e.into()),
            }

            let proxy =
                zbus::Proxy::new(&self.connection, name.to_string(), path, interface).await?;
            Ok(proxy)
        })
    }
}

impl Namespace for DBusNamespace {
    fn claim(&self, app_id: &AppId, dispatcher: Dispatcher) -> Result<Claim, Error> {
        let object = PrimaryObject::new(dispatcher);
        match self.export(app_id.as_str(), &app_id.object_path(), object)? {
            Some(guard) => Ok(Claim::Won(guard)),
            None => Ok(Claim::Taken),
        }
    }

    fn resolve(&self, app_id: &AppId) -> Result<Box<dyn PrimaryService>, Error> {
        let proxy = self.proxy(app_id.as_str(), app_id.object_path(), PRIMARY_INTERFACE)?;
        Ok(Box::new(RemoteObject {
            proxy,
            call_timeout: self.call_timeout,
        }))
    }

    fn export_sink(
        &self,
        service_name: &str,
        session: Arc<CommandLineSession>,
    ) -> Result<NameGuard, Error> {
        let object = SinkObject::new(session);
        self.export(service_name, &object_path_for(service_name), object)?
            .ok_or_else(|| Error::Registration {
                name: service_name.to_string(),
                reason: "name is already taken".to_string(),
            })
    }

    fn connect_sink(&self, service_name: &str) -> Result<Box<dyn CommandLineSink>, Error> {
        let proxy = self.proxy(
            service_name,
            object_path_for(service_name),
            COMMAND_LINE_INTERFACE,
        )?;
        Ok(Box::new(RemoteObject {
            proxy,
            call_timeout: self.call_timeout,
        }))
    }
}

/// Proxy to an exported primary or command line sink
struct RemoteObject {
    proxy: zbus::Proxy<'static>,
    call_timeout: Duration,
}

impl RemoteObject {
    fn call<B>(&self, method: &'static str, body: &B) -> Result<(), Error>
    where
        B: serde::Serialize + DynamicType,
    {
        trace!("Calling {} on {}", method, self.proxy.destination());
        block_on(with_timeout(
            async {
                self.proxy.call_method(method, body).await?;
                Ok(())
            },
            self.call_timeout,
        ))
    }
}

impl PrimaryService for RemoteObject {
    fn activate(&self, platform_data: &PlatformData) -> Result<(), Error> {
        self.call("Activate", &(platform_data.encode(),))
    }

    fn open(
        &self,
        uris: &[String],
        hint: &str,
        platform_data: &PlatformData,
    ) -> Result<(), Error> {
        self.call(
            "Open",
            &(uris.to_vec(), hint.to_string(), platform_data.encode()),
        )
    }

    fn command_line(
        &self,
        service_name: &str,
        arguments: &[Vec<u8>],
        platform_data: &PlatformData,
    ) -> Result<(), Error> {
        self.call(
            "CommandLine",
            &(
                service_name.to_string(),
                arguments.to_vec(),
                platform_data.encode(),
            ),
        )
    }
}

impl CommandLineSink for RemoteObject {
    fn print(&self, text: &str) -> Result<(), Error> {
        self.call("Print", &(text.to_string(),))
    }

    fn print_error(&self, text: &str) -> Result<(), Error> {
        self.call("PrintError", &(text.to_string(),))
    }

    fn set_exit_status(&self, status: i32) -> Result<(), Error> {
        self.call("SetExitStatus", &(status,))
    }
}

async fn with_timeout<T>(
    fut: impl Future<Output = Result<T, Error>>,
    timeout: Duration,
) -> Result<T, Error> {
    let fut = pin!(fut);
    match select(fut, async_io::Timer::after(timeout)).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(Error::Transport(format!(
            "no reply within {:?}",
            timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_timeout_is_reported_as_transport_error() {
        let result: Result<(), Error> = block_on(with_timeout(
            futures::future::pending(),
            Duration::from_millis(20),
        ));
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn finished_call_wins_over_timer() {
        let result = block_on(with_timeout(
            async { Ok::<_, Error>(5) },
            Duration::from_secs(5),
        ));
        assert_eq!(result.unwrap(), 5);
    }
}
