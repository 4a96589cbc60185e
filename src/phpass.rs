//! Portable PHP password hash.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! The portable hash of the PHPass framework, used by WordPress, phpBB
//! and many other PHP applications. It iterates MD5 a power-of-two
//! number of times. It's weak by today's standards and should be
//! upgraded on first successful verification.
//!
//! # Example
//!
//! ```
//! use pwswap::{phpass, Verdict};
//!
//! assert_eq!(phpass::verify("$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0", "test12345").unwrap(),
//!     Verdict::Ok);
//! ```
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt length__: 8 characters.
//!
//! * __Rounds__: base-2 logarithm of the iteration count, between 7
//!   and 31. Default is 8.
//!
//! # Hash Format
//!
//! The format of the hash is
//! *`{id}{rounds}{salt}{checksum}`*, 34 characters in total, where:
//!
//! * *`{id}`* is __`$P$`__ or __`$H$`__ (phpBB). The two are equivalent.
//!
//! * *`{rounds}`* is a single Base64 character encoding the rounds.
//!
//! * *`{salt}`* is an 8-character salt.
//!
//! * *`{checksum}`* is a 22-character Base64 encoding of the checksum.

use std::sync::Arc;

use md5::{Digest, Md5};

use crate::enc_dec::{crypt3_decode, crypt3_encode, decode_int6, encode_int6};
use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Identifier used by most applications.
pub const IDENTIFIER_P: &str = "$P$";
/// Identifier used by phpBB.
pub const IDENTIFIER_H: &str = "$H$";
/// Minimum rounds.
pub const MIN_ROUNDS: u32 = 7;
/// Maximum rounds.
pub const MAX_ROUNDS: u32 = 31;
/// Default rounds.
pub const DEFAULT_ROUNDS: u32 = 8;
const ALGORITHM: &str = "phpass";
const HASH_LEN: usize = 34;
const SALT_LEN: usize = 8;
const SALT_BYTES: usize = 6;
const CHECKSUM_LEN: usize = 22;

fn phpass_digest(pass: &[u8], salt: &[u8], rounds: u32) -> String {
    let mut digest = Md5::new().chain_update(salt).chain_update(pass).finalize();
    for _ in 0..1u64 << rounds {
	digest = Md5::new().chain_update(digest).chain_update(pass).finalize();
    }
    crypt3_encode(&digest)
}

struct Checker<'a> {
    rounds: u32,
    salt: &'a str,
    checksum: &'a str,
}

fn parse_phpass_hash(hash: &str) -> Result<Option<Checker>> {
    let mut hs = parse::HashSlice::new(hash);
    match hs.take(3) {
	Some(IDENTIFIER_P) | Some(IDENTIFIER_H) => (),
	_ => return Ok(None),
    }
    let err = |reason| Error::parse(ALGORITHM, reason);
    if hash.len() != HASH_LEN {
	return Err(err(ParseError::Length { expected: HASH_LEN, actual: hash.len() }));
    }
    let rounds = hs.take(1)
	.and_then(|r| decode_int6(r.as_bytes()[0]))
	.ok_or_else(|| err(ParseError::Encoding("rounds")))?;
    let salt = hs.take(SALT_LEN).ok_or_else(|| err(ParseError::Encoding("salt")))?;
    let checksum = hs.take(CHECKSUM_LEN).ok_or_else(|| err(ParseError::Encoding("checksum")))?;
    if crypt3_decode(checksum).is_none() {
	return Err(err(ParseError::Encoding("checksum")));
    }
    Ok(Some(Checker { rounds, salt, checksum }))
}

impl Checker<'_> {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	check_bounds(ALGORITHM, "rounds", MIN_ROUNDS, MAX_ROUNDS, self.rounds)?;
	let calc = phpass_digest(pass.as_bytes(), self.salt.as_bytes(), self.rounds);
	Ok(consteq(calc.as_bytes(), self.checksum.as_bytes()).into())
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	check_bounds(ALGORITHM, "rounds", opts.min_rounds, opts.max_rounds, self.rounds)
    }
}

/// Verify a password against a PHPass hash.
///
/// Hashes with rounds outside of the range supported by PHPass itself are
/// rejected with a bounds error, without computing the digest.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_phpass_hash(hash)? {
	Some(c) => c.verify(pass),
	None => Ok(Verdict::Skip),
    }
}

/// Bounds for the rounds. Zero values are replaced with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum rounds.
    pub min_rounds: u32,
    /// Maximum rounds.
    pub max_rounds: u32,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts { min_rounds: MIN_ROUNDS, max_rounds: MAX_ROUNDS }
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	ValidationOpts {
	    min_rounds: if self.min_rounds == 0 { MIN_ROUNDS } else { self.min_rounds },
	    max_rounds: if self.max_rounds == 0 { MAX_ROUNDS } else { self.max_rounds },
	}
    }
}

/// Check the rounds of a hash against the bounds.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_phpass_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates `$P$` hashes.
#[derive(Clone)]
pub struct Hasher {
    rounds: u32,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher with the given rounds, coerced into the supported range.
    pub fn new(rounds: u32) -> Hasher {
	Hasher { rounds: rounds.max(MIN_ROUNDS).min(MAX_ROUNDS), source: salt::default_source() }
    }

    /// Draw salt from a custom source.
    pub fn with_source(mut self, source: Arc<dyn SaltSource>) -> Hasher {
	self.source = source;
	self
    }
}

impl Default for Hasher {
    fn default() -> Self {
	Hasher::new(DEFAULT_ROUNDS)
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_phpass_hash(encoded)? {
	    Some(c) => c,
	    None => return Ok(Verdict::Skip),
	};
	match c.verify(password)? {
	    Verdict::Ok if c.rounds != self.rounds => Ok(Verdict::NeedUpdate),
	    v => Ok(v),
	}
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let raw = salt::new_salt(&*self.source, SALT_BYTES, ALGORITHM)?;
	let salt = crypt3_encode(&raw);
	let rounds = encode_int6(self.rounds).ok_or_else(|| Error::InvalidParams {
	    algorithm: ALGORITHM,
	    reason: format!("rounds {}", self.rounds),
	})?;
	let checksum = phpass_digest(password.as_bytes(), salt.as_bytes(), self.rounds);
	Ok(format!("{}{}{}{}", IDENTIFIER_P, rounds, salt, checksum))
    }
}

#[cfg(test)]
mod tests {
    use super::{validate, verify, Hasher, ValidationOpts};
    use crate::error::Error;
    use crate::salt::{FailingSource, FixedSalt};
    use crate::verifier::{Hasher as _, Verifier as _};
    use crate::Verdict;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[case("test12345", "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0")]
    #[case("test1", "$H$9aaaaaSXBjgypwqm.JsMssPLiS8YQ00")]
    #[case("123456", "$H$9PE8jEklgZhgLmZl5.HYJAzfGCQtzi1")]
    #[case("123456", "$H$9pdx7dbOW3Nnt32sikrjAxYFjX8XoK1")]
    #[case("thisisalongertestPW", "$P$912345678LIjjb6PhecupozNBmDndU0")]
    #[case("JohnRipper", "$P$612345678si5M0DDyPpmRCmcltU/YW/")]
    #[case("JohnRipper", "$H$712345678WhEyvy1YWzT4647jzeOmo0")]
    #[case("JohnRipper", "$P$B12345678L6Lpt4BxNotVIMILOa9u81")]
    #[case("", "$P$7JaFQsPzJSuenezefD/3jHgt5hVfNH0")]
    #[case("compL3X!", "$P$FiS0N5L672xzQx1rt1vgdJQRYKnQM9/")]
    fn passlib_vectors(#[case] pass: &str, #[case] hash: &str) {
	assert_eq!(verify(hash, pass).unwrap(), Verdict::Ok);
	assert_eq!(verify(hash, "JohnRipper!").unwrap(), Verdict::Fail);
    }

    #[rstest]
    #[case("$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L")]
    #[case("$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0x")]
    #[case("$P$-IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0")]
    #[case("$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r-L0")]
    fn malformed(#[case] hash: &str) {
	assert_eq!(verify(hash, "test12345").unwrap_err().verdict(), Verdict::Skip);
    }

    #[test]
    fn foreign() {
	assert_eq!(verify("$X$912345678WhEyvy1YWzT4647jzeOmo0", "JohnRipper").unwrap(), Verdict::Skip);
	assert_eq!(verify("$S$ECiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1", "test1234").unwrap(), Verdict::Skip);
    }

    #[test]
    fn excessive_rounds() {
	match verify("$P$Z12345678si5M0DDyPpmRCmcltU/YW/", "JohnRipper") {
	    Err(Error::Bounds(b)) => assert_eq!(b.actual, 37),
	    other => panic!("unexpected {:?}", other),
	}
    }

    #[test]
    fn validation() {
	let opts = ValidationOpts { min_rounds: 8, max_rounds: 30 };
	assert_eq!(validate("$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0", &opts).unwrap(), Verdict::Ok);
	assert_eq!(validate("$P$612345678si5M0DDyPpmRCmcltU/YW/", &opts).unwrap(), Verdict::Ok);
	assert!(validate("$X$912345678WhEyvy1YWzT4647jzeOmo0", &opts).unwrap() == Verdict::Skip);
	for hash in &["$P$112345678si5M0DDyPpmRCmcltU/YW/", "$P$Z12345678si5M0DDyPpmRCmcltU/YW/"] {
	    let err = validate(hash, &opts).unwrap_err();
	    assert!(matches!(err, Error::Bounds(_)));
	    assert_eq!(err.verdict(), Verdict::Fail);
	}
	assert_eq!(ValidationOpts { min_rounds: 10, max_rounds: 0 }.checked(),
	    ValidationOpts { min_rounds: 10, max_rounds: 31 });
    }

    #[test]
    fn rounds_limits() {
	let opts = ValidationOpts::default();
	assert_eq!(validate("$P$512345678si5M0DDyPpmRCmcltU/YW/", &opts).unwrap(), Verdict::Ok);
	assert_eq!(validate("$P$T12345678si5M0DDyPpmRCmcltU/YW/", &opts).unwrap(), Verdict::Ok);
	assert!(matches!(validate("$P$412345678si5M0DDyPpmRCmcltU/YW/", &opts), Err(Error::Bounds(_))));
	assert!(matches!(validate("$P$U12345678si5M0DDyPpmRCmcltU/YW/", &opts), Err(Error::Bounds(_))));
	match verify("$P$U12345678si5M0DDyPpmRCmcltU/YW/", "JohnRipper") {
	    Err(Error::Bounds(b)) => assert_eq!((b.max, b.actual), (31, 32)),
	    other => panic!("unexpected {:?}", other),
	}
    }

    #[test]
    fn hasher() {
	let h = Hasher::new(8).with_source(Arc::new(FixedSalt(b"pepper".to_vec())));
	let hash = h.hash("JohnRipper").unwrap();
	assert!(hash.starts_with("$P$6kJ4QkJaQ"));
	assert_eq!(hash.len(), 34);
	assert_eq!(h.verify(&hash, "JohnRipper").unwrap(), Verdict::Ok);
	assert_eq!(h.verify("$P$612345678si5M0DDyPpmRCmcltU/YW/", "JohnRipper").unwrap(), Verdict::Ok);
	assert_eq!(h.verify("$P$B12345678L6Lpt4BxNotVIMILOa9u81", "JohnRipper").unwrap(), Verdict::NeedUpdate);
	assert_eq!(h.verify("$P$B12345678L6Lpt4BxNotVIMILOa9u81", "johnripper").unwrap(), Verdict::Fail);
	let h = Hasher::new(8).with_source(Arc::new(FailingSource));
	assert!(matches!(h.hash("JohnRipper"), Err(Error::Random { algorithm: "phpass", .. })));
    }
}
