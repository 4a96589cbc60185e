//! Standard *BSD hash.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Bcrypt is a hashing algorithm based on the Blowfish stream cipher,
//! originally developed for OpenBSD and since adopted on other BSD
//! variants and other systems. It has a large salt, variable number
//! of rounds, and no known weaknesses.
//!
//! # Examples
//!
//! To verify a password against a bcrypt hash of any variant:
//!
//! ```
//! use pwswap::{bcrypt, Verdict};
//!
//! let h = "$2y$05$bvIG6Nmid91Mu9RcmmWZfO5HJIMCT8riNW0hEp8f6/FuA2/mHZFpe";
//! assert_eq!(bcrypt::verify(h, "password").unwrap(), Verdict::Ok);
//! ```
//!
//! To generate new hashes with cost 8 and the default variant (__2b__):
//!
//! ```
//! use pwswap::{bcrypt, Hasher};
//!
//! let hash = bcrypt::Hasher::new(8).hash("password").unwrap();
//! assert!(hash.starts_with("$2b$08$"));
//! ```
//!
//! # Parameters
//!
//! * __Password length__: up to 72 bytes. Longer passwords are rejected
//! instead of being silently truncated.
//!
//! * __Salt length__: 16 random bytes, encoded as 22 Base64 characters.
//!
//! * __Cost__: logarithmic value between 4 and 31, inclusive. Increasing
//! the value by 1 doubles the amount of work. The default is 10.
//!
//! # Hash Format
//!
//! The format of the hash is
//! **`$`**_`{variant}`_**`$`**_`{cost}`_**`$`**_`{salt}{checksum}`_, where:
//!
//! * _`{variant}`_ is one of **2a**, **2b**, or **2y**. The default is **2b**.
//! The actual computation is the same for all three variants; the choice
//! exists in order to retain compatibility with other software. See
//! [`Variant`] for details.
//!
//! * _`{cost}`_ is a two-digit decimal cost value between 4 and 31. Values
//! below 10 have a leading zero.
//!
//! * _`{salt}`_ is a 22-character Base64 encoding of the 16 bytes of salt. The
//! salt must be exactly this long.
//!
//! * _`{checksum}`_ is a 31-character Base64 encoding of the computed hash.

use std::fmt;
use std::sync::Arc;

use blowfish::Blowfish;
use byteorder::{ByteOrder, BE};
use zeroize::Zeroizing;

use crate::enc_dec::{bcrypt_hash64_decode, bcrypt_hash64_encode};
use crate::error::{BcryptError, Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Common prefix of all variants.
pub const PREFIX: &str = "$2";
/// Minimum cost.
pub const MIN_COST: u32 = 4;
/// Maximum cost.
pub const MAX_COST: u32 = 31;
/// Default cost.
pub const DEFAULT_COST: u32 = 10;
const ALGORITHM: &str = "bcrypt";
const MAX_PASS_LEN: usize = 72;
const MIN_HASH_LEN: usize = 59;
const ENC_SALT_LEN: usize = 22;
const SALT_BYTES: usize = 16;
const VERSIONS: &[u8] = b"aby";

/// Identifiers of algorithm variants which can be produced.
///
/// Bcrypt has a long history of use, during which a number bugs were found
/// and fixed in the widely-used implementations. Some bugs were serious
/// enough to warrant a change in the minor version number of the algorithm
/// identifier.
///
/// * **2a** fixed a bug in the original OpenBSD version which caused
/// passwords with repeated strings to produce the same hash as those with a
/// single string. It was the most widely used version for a long time.
///
/// * **2y** was introduced by Openwall to mark hashes not affected by a
/// sign-extension bug in their implementation.
///
/// * **2b** fixed a wraparound bug in OpenBSD with unrealistically long
/// passwords. This variant is the current default in most implementations.
///
/// This crate has a single bcrypt algorithm implementation which is equivalent
/// to the **2b** variant. It accepts all three on input, and can generate
/// all three on output, but doesn't treat them specially in any way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Second OpenBSD variant, fixed repeated string hashing.
    V2a,
    /// Third OpenBSD variant, fixed a wraparound bug.
    #[default]
    V2b,
    /// Openwall variant, fixed a sign extension bug.
    V2y,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
	f.write_str(match *self {
	    Variant::V2a => "2a",
	    Variant::V2b => "2b",
	    Variant::V2y => "2y",
	})
    }
}

fn bcrypt(cost: u32, salt: &[u8], password: &[u8], output: &mut [u8; 24]) {
    let mut state = Blowfish::bc_init_state();

    state.salted_expand_key(salt, password);
    for _ in 0..1u64 << cost {
	state.bc_expand_key(password);
	state.bc_expand_key(salt);
    }

    let mut ctext = [0x4f727068, 0x65616e42, 0x65686f6c, 0x64657253, 0x63727944, 0x6f756274];
    for i in (0..6).step_by(2) {
	let mut lr = [ctext[i], ctext[i + 1]];
	for _ in 0..64 {
	    lr = state.bc_encrypt(lr);
	}
	ctext[i] = lr[0];
	ctext[i + 1] = lr[1];
    }
    BE::write_u32_into(&ctext, output);
}

// Encoded checksum of the password under the given salt and cost.
fn bcrypt_checksum(pass: &[u8], salt: &[u8], cost: u32) -> Result<String> {
    if pass.len() > MAX_PASS_LEN {
	return Err(BcryptError::PasswordTooLong.into());
    }
    let mut key = Zeroizing::new(Vec::with_capacity(pass.len() + 1));
    key.extend_from_slice(pass);
    key.push(0);
    key.truncate(MAX_PASS_LEN);
    let mut output = Zeroizing::new([0u8; 24]);
    bcrypt(cost, salt, &key, &mut output);
    Ok(bcrypt_hash64_encode(&output[..23]))
}

fn has_bcrypt_version(hash: &str) -> bool {
    let hb = hash.as_bytes();
    hash.starts_with(PREFIX) && hb.len() > 2 && VERSIONS.contains(&hb[2])
}

/// A decoded bcrypt hash.
struct Checker<'a> {
    cost: u32,
    salt: [u8; SALT_BYTES],
    checksum: &'a str,
}

fn decode(hash: &str) -> std::result::Result<Checker, BcryptError> {
    if hash.len() < MIN_HASH_LEN {
	return Err(BcryptError::HashTooShort);
    }
    let hb = hash.as_bytes();
    if hb[0] != b'$' {
	return Err(BcryptError::InvalidPrefix(hb[0] as char));
    }
    if hb[1] > b'2' {
	return Err(BcryptError::VersionTooNew(hb[1] as char));
    }
    let mut hs = parse::HashSlice::new(hash);
    hs.take(if hb[2] == b'$' { 3 } else { 4 });
    let cost_str = hs.take(2).ok_or(BcryptError::HashTooShort)?;
    let cost = parse::decimal::<u32>("cost", cost_str)
	.map_err(|_| BcryptError::InvalidCost(cost_str.to_owned()))?;
    if cost < MIN_COST || cost > MAX_COST {
	return Err(BcryptError::InvalidCost(cost_str.to_owned()));
    }
    if hs.take(1) != Some("$") {
	return Err(BcryptError::Encoding);
    }
    let enc_salt = hs.take(ENC_SALT_LEN).ok_or(BcryptError::HashTooShort)?;
    let mut salt = [0u8; SALT_BYTES];
    bcrypt_hash64_decode(enc_salt, &mut salt).ok_or(BcryptError::Encoding)?;
    let checksum = hs.take_until(0).ok_or(BcryptError::HashTooShort)?;
    Ok(Checker { cost, salt, checksum })
}

impl Checker<'_> {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	let calc = bcrypt_checksum(pass.as_bytes(), &self.salt, self.cost)?;
	Ok(consteq(calc.as_bytes(), self.checksum.as_bytes()).into())
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	check_bounds(ALGORITHM, "cost", opts.min_cost, opts.max_cost, self.cost)
    }
}

// Hashes without one of the known versions are skipped; otherwise, decoding
// failures are parse errors.
fn parse_bcrypt_hash(hash: &str) -> Result<Option<Checker>> {
    if !has_bcrypt_version(hash) {
	return Ok(None);
    }
    decode(hash)
	.map(Some)
	.map_err(|e| Error::parse(ALGORITHM, ParseError::Bcrypt(e)))
}

/// Extract the cost from a bcrypt hash of any version.
pub fn cost(hash: &str) -> Result<u32> {
    Ok(decode(hash)?.cost)
}

/// Check a password against a hash string which is expected to be a bcrypt
/// hash, whatever its prefix.
///
/// Errors which show that the string is not a bcrypt hash at all (a bad
/// prefix or major version) are classified as `Skip`, all others as `Fail`.
pub fn compare(hash: &str, pass: &str) -> Result<Verdict> {
    decode(hash)?.verify(pass)
}

/// Verify a password against a bcrypt hash.
///
/// Strings without a `$2a$`, `$2b$`, or `$2y$` prefix are skipped.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    if !has_bcrypt_version(hash) {
	return Ok(Verdict::Skip);
    }
    compare(hash, pass)
}

/// Bounds for the cost. Zero values are replaced with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum cost.
    pub min_cost: u32,
    /// Maximum cost.
    pub max_cost: u32,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts { min_cost: MIN_COST, max_cost: MAX_COST }
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	ValidationOpts {
	    min_cost: if self.min_cost == 0 { MIN_COST } else { self.min_cost },
	    max_cost: if self.max_cost == 0 { MAX_COST } else { self.max_cost },
	}
    }
}

/// Check the cost of a hash against the bounds.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_bcrypt_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates bcrypt hashes with a fixed cost.
#[derive(Clone)]
pub struct Hasher {
    cost: u32,
    variant: Variant,
    opts: ValidationOpts,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher with the given cost, coerced into the valid range.
    pub fn new(cost: u32) -> Hasher {
	Hasher {
	    cost: cost.max(MIN_COST).min(MAX_COST),
	    variant: Variant::default(),
	    opts: ValidationOpts::default(),
	    source: salt::default_source(),
	}
    }

    /// Emit a different variant identifier.
    pub fn with_variant(mut self, variant: Variant) -> Hasher {
	self.variant = variant;
	self
    }

    /// Bounds used by the `Validator` implementation.
    pub fn with_validation(mut self, opts: ValidationOpts) -> Hasher {
	self.opts = opts.checked();
	self
    }

    /// Draw salt from a custom source.
    pub fn with_source(mut self, source: Arc<dyn SaltSource>) -> Hasher {
	self.source = source;
	self
    }
}

impl Default for Hasher {
    fn default() -> Self {
	Hasher::new(DEFAULT_COST)
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_bcrypt_hash(encoded)? {
	    Some(c) => c,
	    None => return Ok(Verdict::Skip),
	};
	match c.verify(password)? {
	    Verdict::Ok if c.cost != self.cost => Ok(Verdict::NeedUpdate),
	    v => Ok(v),
	}
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let salt = salt::new_salt(&*self.source, SALT_BYTES, ALGORITHM)?;
	let checksum = bcrypt_checksum(password.as_bytes(), &salt, self.cost)?;
	Ok(format!("${}${:02}${}{}", self.variant, self.cost, bcrypt_hash64_encode(&salt), checksum))
    }
}

impl verifier::Validator for Hasher {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, &self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::{compare, cost, validate, verify, Hasher, ValidationOpts, Variant};
    use crate::error::{BcryptError, Error, ParseError};
    use crate::salt::{FailingSource, FixedSalt};
    use crate::verifier::{Hasher as _, Verifier as _};
    use crate::Verdict;
    use rstest::rstest;
    use std::sync::Arc;

    const V2A: &str = "$2a$12$aLYFkieuqJyeynvptPTxpehSViui5WeAPuR2Xw1wui9CPHEaacmFq";
    const V2B: &str = "$2b$12$bIRGj4QPPoSUMWsJE.4Pk.T1qTpDWz7HhMnuiQhGzGinKPsx/HQdq";
    const V2Y: &str = "$2y$12$hXUrnqdq1RIIYZ2HPytIIe5lXdIvbhqrTvdPsSF7o.jFh817Z6lwm";
    const CHEAP: &str = "$2y$05$bvIG6Nmid91Mu9RcmmWZfO5HJIMCT8riNW0hEp8f6/FuA2/mHZFpe";

    #[rstest]
    #[case(V2A)]
    #[case(V2B)]
    #[case(V2Y)]
    fn variants(#[case] hash: &str) {
	assert_eq!(verify(hash, "password").unwrap(), Verdict::Ok);
    }

    #[test]
    fn mismatch_and_foreign() {
	assert_eq!(verify(CHEAP, "foobar").unwrap(), Verdict::Fail);
	assert_eq!(verify("$scrypt$ln=16,r=8,p=1$cmFuZG9tc2FsdGlzaGFyZA$Rh+NnJNo1I6nRwaNqbDm6kmADswD1+7FTKZ7Ln9D8nQ",
	    "password").unwrap(), Verdict::Skip);
	assert_eq!(verify("$2x$05$bvIG6Nmid91Mu9RcmmWZfO5HJIMCT8riNW0hEp8f6/FuA2/mHZFpe", "password").unwrap(),
	    Verdict::Skip);
    }

    #[test]
    fn compare_errors() {
	let err = compare(&CHEAP.replace("$2y$", "_2y$"), "password").unwrap_err();
	assert!(matches!(err, Error::Bcrypt(BcryptError::InvalidPrefix('_'))));
	assert_eq!(err.verdict(), Verdict::Skip);
	let err = compare(&CHEAP.replace("$2y$", "$3y$"), "password").unwrap_err();
	assert!(matches!(err, Error::Bcrypt(BcryptError::VersionTooNew('3'))));
	assert_eq!(err.verdict(), Verdict::Skip);
	let err = compare("$2b$foo", "password").unwrap_err();
	assert!(matches!(err, Error::Bcrypt(BcryptError::HashTooShort)));
	assert_eq!(err.verdict(), Verdict::Fail);
	let err = compare(&CHEAP.replace("$05$", "$03$"), "password").unwrap_err();
	assert!(matches!(err, Error::Bcrypt(BcryptError::InvalidCost(_))));
	assert_eq!(compare(CHEAP, "password").unwrap(), Verdict::Ok);
    }

    #[test]
    fn cost_extraction() {
	assert_eq!(cost(V2B).unwrap(), 12);
	assert_eq!(cost(CHEAP).unwrap(), 5);
	assert!(cost("$2b$1x$bvIG6Nmid91Mu9RcmmWZfO5HJIMCT8riNW0hEp8f6/FuA2/mHZFpe").is_err());
    }

    #[test]
    fn long_password() {
	assert_eq!(verify(CHEAP, &"x".repeat(72)).unwrap(), Verdict::Fail);
	let pass = "x".repeat(73);
	let err = verify(CHEAP, &pass).unwrap_err();
	assert!(matches!(err, Error::Bcrypt(BcryptError::PasswordTooLong)));
	assert_eq!(err.verdict(), Verdict::Fail);
	assert!(matches!(compare(CHEAP, &pass), Err(Error::Bcrypt(BcryptError::PasswordTooLong))));
	assert!(matches!(Hasher::new(5).verify(CHEAP, &pass), Err(Error::Bcrypt(BcryptError::PasswordTooLong))));
	assert!(matches!(Hasher::new(4).hash(&pass), Err(Error::Bcrypt(BcryptError::PasswordTooLong))));
    }

    #[test]
    fn hasher() {
	let salt = Arc::new(FixedSalt(vec![
	    0x77, 0x12, 0x88, 0xf0, 0xfa, 0x24, 0x7f, 0xfd, 0xce, 0xc3, 0xf4, 0xde, 0xa2, 0x86, 0x1b, 0x85,
	]));
	let h = Hasher::new(5).with_variant(Variant::V2y).with_source(salt);
	assert_eq!(h.hash("password").unwrap(), CHEAP);
	assert_eq!(h.verify(CHEAP, "password").unwrap(), Verdict::Ok);
	assert_eq!(Hasher::new(6).verify(CHEAP, "password").unwrap(), Verdict::NeedUpdate);
	assert_eq!(Hasher::new(6).verify(CHEAP, "foobar").unwrap(), Verdict::Fail);
	let fresh = Hasher::new(4).hash("password").unwrap();
	assert!(fresh.starts_with("$2b$04$"));
	assert_eq!(fresh.len(), 60);
	assert_eq!(verify(&fresh, "password").unwrap(), Verdict::Ok);
	assert!(matches!(Hasher::new(4).with_source(Arc::new(FailingSource)).hash("password"),
	    Err(Error::Random { .. })));
    }

    #[test]
    fn hasher_parse_error_skips() {
	let err = Hasher::default().verify("$2b$foo", "password").unwrap_err();
	assert!(matches!(err, Error::Parse { reason: ParseError::Bcrypt(BcryptError::HashTooShort), .. }));
	assert_eq!(err.verdict(), Verdict::Skip);
    }

    #[test]
    fn validation() {
	let opts = ValidationOpts { min_cost: 5, max_cost: 12 };
	assert_eq!(validate(CHEAP, &opts).unwrap(), Verdict::Ok);
	assert_eq!(validate(V2B, &opts).unwrap(), Verdict::Ok);
	match validate(CHEAP, &ValidationOpts { min_cost: 6, max_cost: 0 }) {
	    Err(Error::Bounds(b)) => assert_eq!((b.param, b.min, b.max, b.actual), ("cost", 6, 31, 5)),
	    other => panic!("unexpected {:?}", other),
	}
	assert_eq!(validate("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1", &opts).unwrap(), Verdict::Skip);
    }
}
