//! In-process registration namespace
//!
//! Several instances of an application can live in one process, each
//! registering through a clone of the same [`LocalNamespace`]. Calls through
//! resolved handles look the owner up on every call, so an owner that went
//! away shows up as a transport failure just like a dropped connection.

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
use log::trace;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

#[derive(Clone)]
enum Entry {
    Primary(Dispatcher),
    Sink(Arc<CommandLineSession>),
}

#[derive(Default)]
struct Names {
    next_id: u64,
    owners: HashMap<String, (u64, Entry)>,
}

#[derive(Clone, Default)]
pub struct LocalNamespace {
    names: Arc<Mutex<Names>>,
}

impl LocalNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().owners.contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Names> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts the entry unless the name is owned, returning a guard that
    /// removes exactly this registration.
    fn try_insert(&self, name: &str, entry: Entry) -> Option<NameGuard> {
        let id = {
            let mut names = self.lock();
            if names.owners.contains_key(name) {
                return None;
            }
            let id = names.next_id;
            names.next_id += 1;
            names.owners.insert(name.to_string(), (id, entry));
            id
        };

        let namespace = self.clone();
        let owned_name = name.to_string();
        Some(NameGuard::new(name, move || {
            let removed = {
                let mut names = namespace.lock();
                match names.owners.get(&owned_name) {
                    Some((owner, _)) if *owner == id => names.owners.remove(&owned_name),
                    _ => None,
                }
            };
            drop(removed);
        }))
    }

    fn lookup(&self, name: &str) -> Option<Entry> {
        self.lock().owners.get(name).map(|(_, entry)| entry.clone())
    }

    fn dispatcher(&self, name: &str) -> Result<Dispatcher, Error> {
        match self.lookup(name) {
            Some(Entry::Primary(dispatcher)) => Ok(dispatcher),
            _ => Err(Error::Transport(format!("{} has no owner", name))),
        }
    }

    fn session(&self, name: &str) -> Result<Arc<CommandLineSession>, Error> {
        match self.lookup(name) {
            Some(Entry::Sink(session)) => Ok(session),
            _ => Err(Error::Transport(format!("{} has no owner", name))),
        }
    }
}

impl Namespace for LocalNamespace {
    fn claim(&self, app_id: &AppId, dispatcher: Dispatcher) -> Result<Claim, Error> {
        match self.try_insert(app_id.as_str(), Entry::Primary(dispatcher)) {
            Some(guard) => Ok(Claim::Won(guard)),
            None => Ok(Claim::Taken),
        }
    }

    fn resolve(&self, app_id: &AppId) -> Result<Box<dyn PrimaryService>, Error> {
        match self.lookup(app_id.as_str()) {
            Some(Entry::Primary(_)) => Ok(Box::new(LocalPrimary {
                namespace: self.clone(),
                name: app_id.as_str().to_string(),
            })),
            _ => Err(Error::Resolution(app_id.to_string())),
        }
    }

    fn export_sink(
        &self,
        service_name: &str,
        session: Arc<CommandLineSession>,
    ) -> Result<NameGuard, Error> {
        self.try_insert(service_name, Entry::Sink(session))
            .ok_or_else(|| Error::Registration {
                name: service_name.to_string(),
                reason: "name is already taken".to_string(),
            })
    }

    fn connect_sink(&self, service_name: &str) -> Result<Box<dyn CommandLineSink>, Error> {
        match self.lookup(service_name) {
            Some(Entry::Sink(_)) => Ok(Box::new(LocalSink {
                namespace: self.clone(),
                name: service_name.to_string(),
            })),
            _ => Err(Error::Resolution(service_name.to_string())),
        }
    }
}

struct LocalPrimary {
    namespace: LocalNamespace,
    name: String,
}

impl PrimaryService for LocalPrimary {
    fn activate(&self, platform_data: &PlatformData) -> Result<(), Error> {
        trace!("Forwarding activate to {}", self.name);
        self.namespace
            .dispatcher(&self.name)?
            .activate(&platform_data.encode())
    }

    fn open(
        &self,
        uris: &[String],
        hint: &str,
        platform_data: &PlatformData,
    ) -> Result<(), Error> {
        trace!("Forwarding open to {}", self.name);
        self.namespace
            .dispatcher(&self.name)?
            .open(uris, hint, &platform_data.encode())
    }

    fn command_line(
        &self,
        service_name: &str,
        arguments: &[Vec<u8>],
        platform_data: &PlatformData,
    ) -> Result<(), Error> {
        trace!("Forwarding command-line to {}", self.name);
        self.namespace.dispatcher(&self.name)?.command_line(
            service_name,
            arguments.to_vec(),
            &platform_data.encode(),
        )
    }
}

struct LocalSink {
    namespace: LocalNamespace,
    name: String,
}

impl CommandLineSink for LocalSink {
    fn print(&self, text: &str) -> Result<(), Error> {
        self.namespace.session(&self.name)?.print(text);
        Ok(())
    }

    fn print_error(&self, text: &str) -> Result<(), Error> {
        self.namespace.session(&self.name)?.print_error(text);
        Ok(())
    }

    fn set_exit_status(&self, status: i32) -> Result<(), Error> {
        self.namespace.session(&self.name)?.set_exit_status(status);
        Ok(())
    }
}
