use crate::AppId;
use crate::Claim;
use crate::Dispatcher;
use crate::Error;
use crate::Namespace;
use crate::PrimaryService;
use log::debug;
use log::warn;
use std::fmt;

/// Owns one claimed name; releasing unexports the object behind it
///
/// Releasing twice is a no-op. Dropping the guard releases it.
pub struct NameGuard {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl NameGuard {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Releasing name {}", self.name);
            release();
        }
    }
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NameGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameGuard")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Result of registering an application id
pub enum Registration {
    /// This instance is the primary and owns the name
    Won(NameGuard),
    /// Another instance is primary, calls go through this handle
    Lost(Box<dyn PrimaryService>),
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Won(guard) => f.debug_tuple("Won").field(guard).finish(),
            Registration::Lost(_) => f.write_str("Lost"),
        }
    }
}

/// Claims `app_id`, or resolves the instance that already owns it.
///
/// If the owner disappears between the failed claim and the resolution the
/// claim is retried once, so this instance becomes the primary instead.
pub fn register(
    namespace: &dyn Namespace,
    app_id: &AppId,
    dispatcher: Dispatcher,
) -> Result<Registration, Error> {
    let mut retried = false;
    loop {
        match namespace.claim(app_id, dispatcher.clone())? {
            Claim::Won(guard) => {
                debug!("Registered {} as the primary instance", app_id);
                return Ok(Registration::Won(guard));
            }
            Claim::Taken => match namespace.resolve(app_id) {
                Ok(remote) => {
                    debug!("{} is owned by another instance", app_id);
                    return Ok(Registration::Lost(remote));
                }
                Err(Error::Resolution(name)) if !retried => {
                    warn!(
                        "Owner of {} vanished before it could be resolved, retrying",
                        name
                    );
                    retried = true;
                }
                Err(e) => return Err(e),
            },
        }
    }
}

/// Resolves the primary without ever trying to become it
pub fn resolve(
    namespace: &dyn Namespace,
    app_id: &AppId,
) -> Result<Box<dyn PrimaryService>, Error> {
    let remote = namespace.resolve(app_id)?;
    debug!("Resolved primary instance of {}", app_id);
    Ok(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn guard_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut guard = NameGuard::new("org.example.App", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        guard.release();
        guard.release();
        assert!(guard.is_released());
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_guard_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let guard = NameGuard::new("org.example.App", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
