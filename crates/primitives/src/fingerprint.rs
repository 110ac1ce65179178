use std::fmt;

use ropey::Rope;
use xxhash_rust::xxh3::{Xxh3, xxh3_128};

/// A 128-bit XXH3 digest of some content.
///
/// Two values with the same fingerprint are treated as identical content.
/// Comparing fingerprints replaces byte-wise comparison when deciding whether
/// a document changed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u128);

impl Fingerprint {
	/// Computes the fingerprint of a byte slice.
	pub fn of(bytes: &[u8]) -> Self {
		Self(xxh3_128(bytes))
	}

	/// Computes the fingerprint of a rope by streaming its chunks.
	///
	/// Equal to [`Fingerprint::of`] over the rope's full UTF-8 byte stream.
	pub fn of_rope(rope: &Rope) -> Self {
		let mut hasher = Xxh3::new();
		for chunk in rope.chunks() {
			hasher.update(chunk.as_bytes());
		}
		Self(hasher.digest128())
	}

	/// Returns the raw digest bytes (little-endian).
	pub fn to_bytes(self) -> [u8; 16] {
		self.0.to_le_bytes()
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in self.to_bytes() {
			write!(f, "{byte:02x}")?;
		}
		Ok(())
	}
}

impl fmt::Debug for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let bytes = self.to_bytes();
		write!(f, "Fingerprint({:02x}{:02x}{:02x}{:02x}..)", bytes[0], bytes[1], bytes[2], bytes[3])
	}
}

/// Content that can produce its own [`Fingerprint`].
pub trait Fingerprinted {
	/// Returns the fingerprint of this content.
	fn fingerprint(&self) -> Fingerprint;
}

impl Fingerprinted for Rope {
	fn fingerprint(&self) -> Fingerprint {
		Fingerprint::of_rope(self)
	}
}

impl Fingerprinted for str {
	fn fingerprint(&self) -> Fingerprint {
		Fingerprint::of(self.as_bytes())
	}
}

impl Fingerprinted for String {
	fn fingerprint(&self) -> Fingerprint {
		Fingerprint::of(self.as_bytes())
	}
}

impl Fingerprinted for [u8] {
	fn fingerprint(&self) -> Fingerprint {
		Fingerprint::of(self)
	}
}
