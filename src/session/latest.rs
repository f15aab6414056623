use std::sync::{Arc, RwLock};

/// Single-writer, multi-reader cell holding the latest value
///
/// Async continuations read through the cell when they resume instead of
/// trusting a value captured when the request was issued, so a selection
/// made while a fetch was in flight is never clobbered by its result.
///
/// # Examples
///
/// ```
/// use difychat::session::LatestValue;
///
/// let active = LatestValue::new(None::<String>);
/// let reader = active.clone();
/// active.set(Some("c1".to_string()));
/// assert_eq!(reader.get().as_deref(), Some("c1"));
/// ```
#[derive(Debug, Default)]
pub struct LatestValue<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for LatestValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> LatestValue<T> {
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Replace the value, returning the previous one
    pub fn set(&self, value: T) -> T {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *guard, value)
    }
}

impl<T: Clone + PartialEq> LatestValue<T> {
    /// Whether the cell currently holds `value`
    pub fn is(&self, value: &T) -> bool {
        *self.inner.read().unwrap_or_else(|p| p.into_inner()) == *value
    }
}
