//! Close actions registered against a session

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, PoisonError},
};

use crate::error::{Result, VellumError};

/// Deferred cleanup run when a session closes
pub(crate) type CloseAction = Box<dyn FnOnce() -> Result<()> + Send>;

/// Last-in-first-out stack of close actions
pub(crate) struct CleanupStack {
    actions: Mutex<Vec<CloseAction>>,
}

impl CleanupStack {
    pub(crate) fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, action: CloseAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }

    pub(crate) fn len(&self) -> usize {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every registered action, most recent first.
    ///
    /// A failing or panicking action does not stop the others; every failure
    /// is collected into one [`VellumError::CloseFailed`].
    pub(crate) fn run_all(&self) -> Result<()> {
        let actions = std::mem::take(
            &mut *self
                .actions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let failures: Vec<String> = actions
            .into_iter()
            .rev()
            .filter_map(|action| run_one(action).err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(VellumError::CloseFailed { failures })
        }
    }
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupStack")
            .field("pending", &self.len())
            .finish()
    }
}

/// Run a single action, turning errors and panics into a failure message
pub(crate) fn run_one(action: CloseAction) -> std::result::Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("close action panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
