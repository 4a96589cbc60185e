//! Drupal 7 password hash.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Drupal 7 adapted the PHPass portable hash to SHA-512, keeping the
//! framing but truncating the encoded digest so that the whole hash
//! fits in 55 characters.
//!
//! # Example
//!
//! ```
//! use pwswap::{drupal7, Verdict};
//!
//! let h = "$S$ECiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1";
//! assert_eq!(drupal7::verify(h, "test1234").unwrap(), Verdict::Ok);
//! ```
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$S$`__*`{count}{salt}{checksum}`*, where:
//!
//! * *`{count}`* is a single Base64 character. The iteration count is
//!   two raised to its value.
//!
//! * *`{salt}`* is an 8-character salt.
//!
//! * *`{checksum}`* is the first 43 characters of the Base64 encoded
//!   SHA-512 digest.

use std::sync::Arc;

use sha2::{Digest, Sha512};

use crate::enc_dec::{crypt3_encode, decode_int6, encode_int6};
use crate::error::{Error, ParseError};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Hash identifier.
pub const IDENTIFIER: &str = "$S$";
/// Total length of a Drupal 7 hash.
pub const HASH_LEN: usize = 55;
/// Default minimum number of iterations accepted by validation.
pub const DEFAULT_MIN_ITERATIONS: u64 = 1000;
/// Default maximum number of iterations accepted by validation.
pub const DEFAULT_MAX_ITERATIONS: u64 = 500000;
/// Default base-2 logarithm of the iteration count for new hashes.
pub const DEFAULT_COUNT_LOG2: u32 = 15;
const MIN_COUNT_LOG2: u32 = 7;
const MAX_COUNT_LOG2: u32 = 30;
const ALGORITHM: &str = "drupal7";
const SALT_BYTES: usize = 6;

fn drupal7_digest(pass: &[u8], salt: &[u8], iterations: u64) -> String {
    let mut digest = Sha512::new().chain_update(salt).chain_update(pass).finalize();
    for _ in 0..iterations {
	digest = Sha512::new().chain_update(digest).chain_update(pass).finalize();
    }
    crypt3_encode(&digest)
}

struct Checker<'a> {
    count_log2: u32,
    salt: &'a [u8],
    checksum: &'a [u8],
}

impl Checker<'_> {
    fn iterations(&self) -> u64 {
	1u64 << self.count_log2
    }
}

fn parse_drupal7_hash(hash: &str) -> Result<Option<Checker>> {
    if !hash.starts_with(IDENTIFIER) {
	return Ok(None);
    }
    let err = |reason| Error::parse(ALGORITHM, reason);
    if hash.len() != HASH_LEN {
	return Err(err(ParseError::Length { expected: HASH_LEN, actual: hash.len() }));
    }
    let hb = hash.as_bytes();
    let count_log2 = decode_int6(hb[3]).ok_or_else(|| err(ParseError::Encoding("iteration count")))?;
    Ok(Some(Checker { count_log2, salt: &hb[4..12], checksum: &hb[12..] }))
}

impl Checker<'_> {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	check_bounds(ALGORITHM, "iteration count", MIN_COUNT_LOG2, MAX_COUNT_LOG2, self.count_log2)?;
	let calc = drupal7_digest(pass.as_bytes(), self.salt, self.iterations());
	let calc = &calc.as_bytes()[..self.checksum.len().min(calc.len())];
	Ok(consteq(calc, self.checksum).into())
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	check_bounds("Drupal 7", "iterations", opts.min_iterations, opts.max_iterations, self.iterations())
    }
}

/// Verify a password against a Drupal 7 hash.
///
/// Iteration counts outside of the range supported by Drupal itself, 2^7
/// to 2^30, are rejected with a bounds error.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_drupal7_hash(hash)? {
	Some(c) => c.verify(pass),
	None => Ok(Verdict::Skip),
    }
}

/// Bounds for the iteration count. Zero values are replaced with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum iterations.
    pub min_iterations: u64,
    /// Maximum iterations.
    pub max_iterations: u64,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts { min_iterations: DEFAULT_MIN_ITERATIONS, max_iterations: DEFAULT_MAX_ITERATIONS }
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	ValidationOpts {
	    min_iterations: if self.min_iterations == 0 { DEFAULT_MIN_ITERATIONS } else { self.min_iterations },
	    max_iterations: if self.max_iterations == 0 { DEFAULT_MAX_ITERATIONS } else { self.max_iterations },
	}
    }
}

/// Check the iteration count of a hash against the bounds.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_drupal7_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates Drupal 7 hashes.
#[derive(Clone)]
pub struct Hasher {
    count_log2: u32,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher using `2^count_log2` iterations. The exponent is coerced
    /// into the range supported by Drupal.
    pub fn new(count_log2: u32) -> Hasher {
	Hasher {
	    count_log2: count_log2.max(MIN_COUNT_LOG2).min(MAX_COUNT_LOG2),
	    source: salt::default_source(),
	}
    }

    /// Draw salt from a custom source.
    pub fn with_source(mut self, source: Arc<dyn SaltSource>) -> Hasher {
	self.source = source;
	self
    }
}

impl Default for Hasher {
    fn default() -> Self {
	Hasher::new(DEFAULT_COUNT_LOG2)
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_drupal7_hash(encoded)? {
	    Some(c) => c,
	    None => return Ok(Verdict::Skip),
	};
	match c.verify(password)? {
	    Verdict::Ok if c.count_log2 != self.count_log2 => Ok(Verdict::NeedUpdate),
	    v => Ok(v),
	}
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let raw = salt::new_salt(&*self.source, SALT_BYTES, ALGORITHM)?;
	let salt = crypt3_encode(&raw);
	let count = encode_int6(self.count_log2).ok_or_else(|| Error::InvalidParams {
	    algorithm: ALGORITHM,
	    reason: format!("iteration count 2^{}", self.count_log2),
	})?;
	let mut encoded = format!("{}{}{}", IDENTIFIER, count, salt);
	encoded.push_str(&drupal7_digest(password.as_bytes(), salt.as_bytes(), 1u64 << self.count_log2));
	encoded.truncate(HASH_LEN);
	Ok(encoded)
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

    const TEST1234: &str = "$S$ECiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1";

    #[rstest]
    #[case("test1234", TEST1234, Verdict::Ok)]
    #[case("msuHVPek37GmAhTMXTQC", "$S$EvuUkmwMTwIJFXf2t2jFRD4kI5.4s.nVIMqq7cpGIRDdw8N6X.dF", Verdict::Ok)]
    #[case("test1234", "$S$ECDgn4Og5K1g.zVRmF132EW0HfJZ5oaTBsw/roww5SWjwTEfZxqU", Verdict::Fail)]
    #[case("test1235", TEST1234, Verdict::Fail)]
    #[case("test1234", "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0", Verdict::Skip)]
    fn verification(#[case] pass: &str, #[case] hash: &str, #[case] want: Verdict) {
	assert_eq!(verify(hash, pass).unwrap(), want);
    }

    #[rstest]
    #[case("$S$ECiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX")]
    #[case("$S$ECiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1x")]
    #[case("$S$@CiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1")]
    fn malformed(#[case] hash: &str) {
	assert_eq!(verify(hash, "test1234").unwrap_err().verdict(), Verdict::Skip);
    }

    #[test]
    fn validation() {
	let opts = ValidationOpts { min_iterations: 1000, max_iterations: 500000 };
	assert_eq!(validate(TEST1234, &opts).unwrap(), Verdict::Ok);
	for hash in &["$S$ZCiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1",
		      "$S$1CiTwp95d.CM.PorExdDeWcec0F1SeaEsf3Yon9RUcrhQy4Q7XX1"] {
	    match validate(hash, &opts) {
		Err(Error::Bounds(b)) => assert_eq!((b.algorithm, b.param), ("Drupal 7", "iterations")),
		other => panic!("unexpected {:?}", other),
	    }
	}
	assert_eq!(ValidationOpts { min_iterations: 2000, max_iterations: 0 }.checked(),
	    ValidationOpts { min_iterations: 2000, max_iterations: 500000 });
    }

    #[test]
    fn hasher() {
	let h = Hasher::new(16).with_source(Arc::new(FixedSalt(b"pepper".to_vec())));
	let hash = h.hash("test1234").unwrap();
	assert!(hash.starts_with("$S$EkJ4QkJaQ"));
	assert_eq!(hash.len(), 55);
	assert_eq!(h.verify(&hash, "test1234").unwrap(), Verdict::Ok);
	assert_eq!(h.verify(TEST1234, "test1234").unwrap(), Verdict::Ok);
	assert_eq!(Hasher::default().verify(TEST1234, "test1234").unwrap(), Verdict::NeedUpdate);
	let h = Hasher::new(16).with_source(Arc::new(FailingSource));
	assert!(matches!(h.hash("test1234"), Err(Error::Random { algorithm: "drupal7", .. })));
    }
}
