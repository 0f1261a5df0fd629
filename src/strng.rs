use arcstr::ArcStr;

/// A string type with better properties for our use case than `String`:
/// * Cheap cloning (ref counting)
/// * Efficient storage (8 bytes vs 24 bytes)
/// * Immutable
///
/// A thin wrapper around `arcstr::ArcStr`.
pub type Strng = ArcStr;

pub const EMPTY: Strng = literal!("");

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	Strng::from(s.as_ref())
}

pub use arcstr::{format, literal};

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interning() {
		let a = new("abc");
		let b = new("abc");
		assert_eq!(std::mem::size_of::<Strng>(), 8);
		assert_eq!(std::format!("{a}"), "abc");
		assert_eq!(a, b);
	}
}
