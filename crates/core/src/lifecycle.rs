use tracing::trace;

use crate::DriveList;

/// Releases a drive list and everything it owns.
///
/// The list is taken by value, so it cannot be read or released again
/// afterwards; the borrow checker rejects both at compile time.
pub fn free_drive_list(list: DriveList) {
    list.release();
}

impl DriveList {
    pub fn release(self) {
        trace!(drives = self.count(), "releasing drive list");
        drop(self);
    }
}
