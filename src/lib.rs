//! Verification and transparent upgrading of password hashes.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Password databases which outlive a few generations of software tend to
//! accumulate hashes in many formats: MD5-crypt from an old Linux box, PHPass
//! from a blog, PBKDF2 from a Python application, bcrypt from last year's
//! rewrite. This crate verifies passwords against all of those, and, when a
//! password checks out against an outdated format or outdated parameters,
//! produces a fresh hash with the currently preferred algorithm, so that the
//! stored value can be replaced on the spot.
//!
//! # Getting Started
//!
//! Add the following to the `[dependencies]` section of your `Cargo.toml`:
//!
//! ```toml
//! pwswap = "0.1"
//! ```
//!
//! # Examples
//!
//! To verify a password hashed with a known algorithm:
//!
//! ```
//! use pwswap::{phpass, Verdict};
//!
//! let h = "$P$612345678si5M0DDyPpmRCmcltU/YW/";
//! assert_eq!(phpass::verify(h, "JohnRipper").unwrap(), Verdict::Ok);
//! ```
//!
//! To accept several legacy formats, and upgrade them to Argon2id:
//!
//! ```
//! use pwswap::{argon2, md5_crypt, phpass, Swapper};
//!
//! let swapper = Swapper::new(argon2::Hasher::id(argon2::Params::RECOMMENDED_ID))
//!     .fallback(md5_crypt::verify)
//!     .fallback(phpass::verify);
//! let updated = swapper.verify("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1", "password").unwrap();
//! assert!(updated.unwrap().starts_with("$argon2id$v=19$m=65536,t=1,p=4$"));
//! ```
//!
//! # Summary
//!
//! Every algorithm lives in its own module. Each module has a `verify`
//! function, which can be used directly or handed to a [`Swapper`] as a
//! fallback verifier, and a `Hasher` struct which produces new hashes.
//! Algorithms with tunable parameters also have a `Params` struct, whose
//! equality with the parameters decoded from a hash determines whether an
//! update is due, and `ValidationOpts`, which bound the parameters accepted
//! by [`Validator::validate`].
//!
//! * Modern: [argon2] (i and id), [scrypt], [bcrypt], [pbkdf2] (HMAC with
//!   SHA-1, SHA-224, SHA-256, SHA-384, or SHA-512).
//!
//! * Unix legacy: [sha2_crypt] (SHA-256 and SHA-512), [md5_crypt].
//!
//! * Web application legacy: [phpass] (WordPress, phpBB), [drupal7],
//!   [md5_salted], [md5_plain].
//!
//! Verifiers are tried in order, and a hash string is claimed by the first
//! verifier which recognizes its format. Since [md5_plain] claims any
//! hexadecimal string, and reports a parse error for anything else, it
//! should come last.

#![warn(missing_docs)]

mod enc_dec;
pub mod error;
pub mod salt;
pub mod verifier;
mod swapper;
pub mod argon2;
pub mod bcrypt;
pub mod drupal7;
pub mod md5_crypt;
pub mod md5_plain;
pub mod md5_salted;
pub mod pbkdf2;
pub mod phpass;
pub mod scrypt;
pub mod sha2_crypt;

pub use crate::error::Error;
pub use crate::swapper::Swapper;
pub use crate::verifier::{Hasher, Validator, Verdict, Verifier};

/// Type alias for the Result type.
pub type Result<T> = std::result::Result<T, error::Error>;

fn consteq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

mod parse {
    use std::str::{self, FromStr};
    use std::num::ParseIntError;
    use crate::error::ParseError;

    /// Parse a decimal field, rejecting signs and whitespace.
    pub fn decimal<T>(field: &'static str, s: &str) -> Result<T, ParseError>
	where T: FromStr<Err = ParseIntError>
    {
	if !s.bytes().all(|b| b.is_ascii_digit()) {
	    return Err(ParseError::Encoding(field));
	}
	s.parse::<T>().map_err(|source| ParseError::Number { field, source })
    }

    /// Parse a `key=value` pair with a decimal value.
    pub fn key_value<T>(key: &'static str, pair: Option<&str>) -> Result<T, ParseError>
	where T: FromStr<Err = ParseIntError>
    {
	let pair = pair.ok_or(ParseError::MissingField(key))?;
	match pair.split_once('=') {
	    Some((k, v)) if k == key => decimal(key, v),
	    _ => Err(ParseError::Key(key)),
	}
    }

    /// A trait for traversing a hash string.
    ///
    /// Hash strings have internal structure: they consist of a concatenation
    /// of a number of substrings. This trait enables extracting references to
    /// those substrings with the necessary semantics.
    pub trait HashIterator {
	/// The substring that is returned by methods.
	type Elem;

	/// Extract a fixed-size substring.
	///
	/// There must be <i>at least</i> `n` ASCII characters remaining in the
	/// string. If there are less, `None` is returned. If called with a non-zero
	/// `n`, this method drains the string: if there are exactly `n` characters
	/// remaining, subsequent calls will return `None`.
	///
	/// Calling `take` with `n` set to zero returns an empty string if the main
	/// string is not drained.
	fn take(&mut self, n: usize) -> Option<Self::Elem>;

	/// Extract a substring delimited by a byte.
	///
	/// Return a substring from the current position to the next occurrence of the
	/// ASCII delimiter `ac` or the end of the string. If the delimiter is found,
	/// advance the position one byte after it. Drains the string.
	fn take_until(&mut self, ac: u8) -> Option<Self::Elem>;

	/// Returns `true` if the string is drained.
	fn at_end(&self) -> bool;
    }

    pub struct HashSlice<'a> {
	bp: &'a [u8],
	len: usize,
	pos: usize,
    }

    impl<'a> HashSlice<'a> {
	pub fn new(hash: &'a str) -> HashSlice<'a> {
	    HashSlice { bp: hash.as_bytes(), len: hash.len(), pos: 0 }
	}
    }

    impl<'a> HashIterator for HashSlice<'a> {
	type Elem = &'a str;

	fn take(&mut self, n: usize) -> Option<Self::Elem> {
	    if self.pos > self.len {
		return None;
	    }
	    let sp = self.pos;
	    if sp + n > self.len {
		self.pos = self.len + 1;
		None
	    } else {
		let endp = self.pos + n;
		self.pos = endp + if endp == self.len { 1 } else { 0 };
		str::from_utf8(&self.bp[sp..endp]).ok()
	    }
	}

	fn take_until(&mut self, ac: u8) -> Option<Self::Elem> {
	    if self.pos > self.len {
		return None;
	    }
	    let oldp = self.pos;
	    let sp = self.bp[oldp..].iter().position(|&b| b == ac).map_or(self.len, |p| oldp + p);
	    self.pos = sp + 1;
	    str::from_utf8(&self.bp[oldp..sp]).ok()
	}

	fn at_end(&self) -> bool {
	    self.pos > self.len
	}
    }

}
