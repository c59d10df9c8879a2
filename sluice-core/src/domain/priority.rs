//! Request priorities.

/// A request priority. Lower values are scheduled first.
pub type Priority = u32;

/// The priority given to requests that do not set one.
pub const DEFAULT_PRIORITY: Priority = 5000;

/// Resolves an optional priority to the effective one.
pub fn effective(priority: Option<Priority>) -> Priority {
    priority.unwrap_or(DEFAULT_PRIORITY)
}
