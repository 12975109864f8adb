//! Load-once handles for model backends.

use std::{fmt, sync::Arc};

use anyhow::Result;
use log::debug;
use once_cell::sync::OnceCell;

type Loader<T> = Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

/// A value that is loaded on first use and shared afterwards.
///
/// Concurrent first callers block while one of them runs the loader; later
/// callers read the cell without locking. A failed load leaves the handle
/// empty so the next caller tries again.
pub struct LazyHandle<T: ?Sized> {
    label: String,
    cell: OnceCell<Arc<T>>,
    loader: Loader<T>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyHandle<T> {
    /// A handle that runs `loader` the first time it is needed.
    pub fn new<F>(label: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// A handle that already holds `value`.
    pub fn ready(label: impl Into<String>, value: Arc<T>) -> Self {
        Self {
            label: label.into(),
            cell: OnceCell::with_value(Arc::clone(&value)),
            loader: Box::new(move || Ok(Arc::clone(&value))),
        }
    }

    /// Return the loaded value, loading it first if needed.
    pub fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                debug!("loading {}", self.label);
                (self.loader)()
            })
            .map(Arc::clone)
    }

    /// Whether the value has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Name used in log messages.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T: ?Sized> fmt::Debug for LazyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyHandle")
            .field("label", &self.label)
            .field("loaded", &self.cell.get().is_some())
            .finish()
    }
}
