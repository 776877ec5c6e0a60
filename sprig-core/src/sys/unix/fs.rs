use std::path::Path;

impl crate::sys::fs::PathExt for Path {
    fn executable(&self) -> bool {
        nix::unistd::access(self, nix::unistd::AccessFlags::X_OK).is_ok()
    }
}
