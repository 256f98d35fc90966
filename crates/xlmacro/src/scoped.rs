//! Scope-bound ownership of handles to externally-owned objects.
//!
//! Excel accounts for its objects independently of this process's memory, so
//! every handle the bridge issues must be handed back explicitly. A
//! [`ScopedHandle`] does that from `Drop`, which runs on normal return, on `?`
//! propagation, and while unwinding from a panic.
//!
//! ```rust
//! use std::cell::RefCell;
//! use xlmacro::ScopedHandle;
//!
//! let log = RefCell::new(Vec::new());
//! {
//!     let app = ScopedHandle::new("application", 7u64, |h| {
//!         log.borrow_mut().push(format!("release {h}"));
//!         Ok(())
//!     })
//!     .with_session_end(|h| {
//!         log.borrow_mut().push(format!("quit {h}"));
//!         Ok(())
//!     });
//!     assert_eq!(*app, 7);
//! }
//! assert_eq!(*log.borrow(), ["quit 7", "release 7"]);
//! ```

use std::fmt;
use std::ops::Deref;

use crate::error::{Error, Result};

type Action<'a, T> = Box<dyn FnOnce(&T) -> Result<()> + 'a>;

/// Owns the obligation to release a handle, not the object behind it.
///
/// Teardown runs at most once: first the optional session-ending action
/// (quit, close), then the release action. A failing session end does not
/// skip the release.
pub struct ScopedHandle<'a, T> {
    resource: &'static str,
    handle: T,
    end_session: Option<Action<'a, T>>,
    release: Option<Action<'a, T>>,
}

impl<'a, T> ScopedHandle<'a, T> {
    /// Wrap an already-acquired handle. `resource` names it in logs and errors.
    pub fn new(
        resource: &'static str,
        handle: T,
        release: impl FnOnce(&T) -> Result<()> + 'a,
    ) -> Self {
        Self {
            resource,
            handle,
            end_session: None,
            release: Some(Box::new(release)),
        }
    }

    /// Run `end_session` before the release action.
    pub fn with_session_end(mut self, end_session: impl FnOnce(&T) -> Result<()> + 'a) -> Self {
        self.end_session = Some(Box::new(end_session));
        self
    }

    pub fn get(&self) -> &T {
        &self.handle
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Tear down now and report the first failure. Dropping afterwards is a
    /// no-op.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Some(end_session) = self.end_session.take() {
            if let Err(e) = end_session(&self.handle) {
                tracing::warn!(resource = self.resource, error = %e, "Failed to end session");
                first_error = Some(e);
            }
        }

        if let Some(release) = self.release.take() {
            match release(&self.handle) {
                Ok(()) => tracing::debug!(resource = self.resource, "Released handle"),
                Err(e) => {
                    tracing::warn!(resource = self.resource, error = %e, "Failed to release handle");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(source) => Err(Error::Teardown {
                resource: self.resource,
                source: Box::new(source),
            }),
            None => Ok(()),
        }
    }
}

impl<T> Deref for ScopedHandle<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T> Drop for ScopedHandle<'_, T> {
    fn drop(&mut self) {
        // failures were already logged by teardown
        let _ = self.teardown();
    }
}

impl<T: fmt::Debug> fmt::Debug for ScopedHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("resource", &self.resource)
            .field("handle", &self.handle)
            .field("released", &self.release.is_none())
            .finish()
    }
}
