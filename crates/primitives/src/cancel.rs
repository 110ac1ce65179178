use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Yield-point checks for [`CancellationToken`].
pub trait CancelExt {
	/// Returns [`Error::Cancelled`] if cancellation was requested.
	fn check(&self) -> Result<()>;
}

impl CancelExt for CancellationToken {
	#[inline]
	fn check(&self) -> Result<()> {
		if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
	}
}
