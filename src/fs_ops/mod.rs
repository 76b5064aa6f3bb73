//! Filesystem operations: lock markers, temp copy, verification, atomic publish
//! and the retrying transfer built on them.

mod atomic;
mod backend;
mod digest;
pub(crate) mod helpers;
pub mod lock;
mod io_copy;
mod meta;
pub mod retry;
mod space;
mod transfer;
pub(crate) mod util;

pub use backend::{Filesystem, LocalFs};
pub use lock::{LockToken, is_lock_marker, is_locked, lock_path_for};
pub use retry::{MAX_ATTEMPTS, RetryEvent, RetryPolicy, RetryState};
pub use space::SPACE_CUSHION;
pub use transfer::{SkipReason, TransferExecutor, TransferOutcome, TransferSettings};
pub use util::TEMP_SUFFIX;
