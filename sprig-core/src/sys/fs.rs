//! Filesystem utilities

/// Trait for probing paths beyond what `std::path::Path` exposes directly.
pub trait PathExt {
    /// Returns whether the path references an executable file for the
    /// current user.
    fn executable(&self) -> bool;
}
