use std::path::Path;

impl crate::sys::fs::PathExt for Path {
    fn executable(&self) -> bool {
        // Windows has no execute permission bit; any regular file reachable
        // through the search path is considered runnable.
        self.is_file()
    }
}
