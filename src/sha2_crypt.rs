//! SHA-256 and SHA-512 based hashes.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! These algorithms were developed as an alternative to bcrypt
//! with NIST-approved hashing functions. They are similar to
//! MD5-crypt, but have a variable number of rounds and a larger
//! salt. Both are the default system hash on many Linux
//! distributions.
//!
//! # Example
//!
//! ```
//! use pwswap::{sha2_crypt, Verdict};
//!
//! let h =
//!     "$6$rounds=5000$saltstring$svn8UoSVapNtMuq1ukKS4tPQd8iKwSMHWjl/O817G3uBnIFN\
//!      jnQJuesI68u4OTLiBFdcbYEdFCoEOfaS35inz1";
//! assert_eq!(sha2_crypt::verify(h, "Hello world!").unwrap(), Verdict::Ok);
//! ```
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt length__: 0 to 16 characters. Longer salts are truncated.
//!   Generated salts have 16 characters.
//!
//! * __Rounds__: 1000 to 999999999. Default is 5000. If a number
//!   outside of the range is given, it is coerced to the nearest
//!   limit for hashing, while validation sees the number as written.
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$`__*`{id}`*__`$rounds=`__*`{rounds}`*__$__*`{salt}`*__$__*`{checksum}`*, where:
//!
//! * *`{id}`* is __5__ for SHA-256 and __6__ for SHA-512.
//!
//! * *`{rounds}`* is the number of rounds, encoded as a decimal number
//!   without leading zeroes.
//!
//! * *`{salt}`* is the salt string.
//!
//! * *`{checksum}`* is a 43-character (SHA-256) or 86-character (SHA-512)
//!   Base64 encoding of the checksum.
//!
//! The format __`$`__*`{id}`*__`$`__*`{salt}`*__$__*`{checksum}`* is accepted
//! for the default number of rounds; generated hashes always carry the
//! rounds field.

use std::cmp::min;
use std::sync::Arc;

use sha2::{Digest, Sha256, Sha512};

use crate::enc_dec::{crypt3_decode, crypt3_encode};
use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Minimum rounds.
pub const MIN_ROUNDS: u32 = 1000;
/// Maximum rounds.
pub const MAX_ROUNDS: u32 = 999999999;
/// Default number of rounds.
pub const DEFAULT_ROUNDS: u32 = 5000;
/// Maximum (and generated) salt length.
pub const MAX_SALT_LEN: usize = 16;
const ALGORITHM: &str = "sha2";
const ROUNDS_PREFIX: &str = "rounds=";

const SHA256_TRANSPOSE: &[u8] = b"\x14\x0a\x00\x0b\x01\x15\x02\x16\x0c\x17\x0d\x03\x0e\x04\x18\x05\
				  \x19\x0f\x1a\x10\x06\x11\x07\x1b\x08\x1c\x12\x1d\x13\x09\x1e\x1f";
const SHA512_TRANSPOSE: &[u8] = b"\x2a\x15\x00\x01\x2b\x16\x17\x02\x2c\x2d\x18\x03\x04\x2e\x19\x1a\
				  \x05\x2f\x30\x1b\x06\x07\x31\x1c\x1d\x08\x32\x33\x1e\x09\x0a\x34\
				  \x1f\x20\x0b\x35\x36\x21\x0c\x0d\x37\x22\x23\x0e\x38\x39\x24\x0f\
				  \x10\x3a\x25\x26\x11\x3b\x3c\x27\x12\x13\x3d\x28\x29\x14\x3e\x3f";

/// Digest width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// SHA-256, identifier __5__.
    Sha256,
    /// SHA-512, identifier __6__.
    Sha512,
}

impl Variant {
    fn ident(self) -> &'static str {
	match self {
	    Variant::Sha256 => "5",
	    Variant::Sha512 => "6",
	}
    }

    fn name(self) -> &'static str {
	match self {
	    Variant::Sha256 => "SHA-256",
	    Variant::Sha512 => "SHA-512",
	}
    }

    fn checksum_len(self) -> usize {
	match self {
	    Variant::Sha256 => 43,
	    Variant::Sha512 => 86,
	}
    }

    fn checksum(self, pass: &[u8], salt: &[u8], rounds: u32) -> String {
	match self {
	    Variant::Sha256 => sha2_crypt::<Sha256>(pass, salt, rounds, SHA256_TRANSPOSE),
	    Variant::Sha512 => sha2_crypt::<Sha512>(pass, salt, rounds, SHA512_TRANSPOSE),
	}
    }
}

/// Hashing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Params {
    /// Digest width.
    pub variant: Variant,
    /// Number of rounds, as written in the hash.
    pub rounds: u32,
}

// Repeat `src` until `len` bytes are produced.
fn repeat_to_len(src: &[u8], len: usize) -> Vec<u8> {
    src.iter().copied().cycle().take(len).collect()
}

fn sha2_crypt<D: Digest>(pass: &[u8], salt: &[u8], rounds: u32, trn_table: &[u8]) -> String {
    let dsize = <D as Digest>::output_size();

    let mut dgst_b = D::new();
    dgst_b.update(pass);
    dgst_b.update(salt);
    dgst_b.update(pass);
    let hash_b = dgst_b.finalize();

    let mut dgst_a = D::new();
    dgst_a.update(pass);
    dgst_a.update(salt);

    let plen = pass.len();
    let mut p = plen;
    while p > 0 {
	dgst_a.update(&hash_b[..min(p, dsize)]);
	if p < dsize {
	    break;
	}
	p -= dsize;
    }

    p = plen;
    while p > 0 {
	match p & 1 {
	    0 => dgst_a.update(pass),
	    _ => dgst_a.update(&hash_b),
	}
	p >>= 1;
    }

    let mut hash_a = dgst_a.finalize().to_vec();

    let mut dgst_p = D::new();
    for _ in 0..plen {
	dgst_p.update(pass);
    }
    let seq_p = repeat_to_len(&dgst_p.finalize(), plen);

    let mut dgst_s = D::new();
    for _ in 0..16 + (hash_a[0] as usize) {
	dgst_s.update(salt);
    }
    let seq_s = repeat_to_len(&dgst_s.finalize(), salt.len());

    for r in 0..rounds {
	let mut dgst_c = D::new();
	if r % 2 == 1 {
	    dgst_c.update(&seq_p);
	} else {
	    dgst_c.update(&hash_a);
	}
	if r % 3 > 0 {
	    dgst_c.update(&seq_s);
	}
	if r % 7 > 0 {
	    dgst_c.update(&seq_p);
	}
	if r % 2 == 1 {
	    dgst_c.update(&hash_a);
	} else {
	    dgst_c.update(&seq_p);
	}
	hash_a = dgst_c.finalize().to_vec();
    }

    let transposed = trn_table.iter().map(|&ti| hash_a[ti as usize]).collect::<Vec<_>>();
    crypt3_encode(&transposed)
}

fn clamp_rounds(rounds: u32) -> u32 {
    rounds.max(MIN_ROUNDS).min(MAX_ROUNDS)
}

fn truncate_salt(salt: &[u8]) -> &[u8] {
    &salt[..min(salt.len(), MAX_SALT_LEN)]
}

/// Hash a password with the given salt and parameters.
///
/// The salt is truncated to 16 bytes, and the rounds are coerced into the
/// valid range. The result always includes the rounds field.
pub fn hash_with(params: Params, salt: &str, pass: &str) -> String {
    let salt = truncate_salt(salt.as_bytes());
    let rounds = clamp_rounds(params.rounds);
    let checksum = params.variant.checksum(pass.as_bytes(), salt, rounds);
    format!("${}${}{}${}${}", params.variant.ident(), ROUNDS_PREFIX, rounds,
	String::from_utf8_lossy(salt), checksum)
}

struct Checker<'a> {
    params: Params,
    // As written in the hash; `params.rounds` saturates.
    stored_rounds: u64,
    salt: &'a [u8],
    checksum: &'a str,
}

fn parse_sha2_hash(hash: &str) -> Result<Option<Checker>> {
    let mut hs = parse::HashSlice::new(hash);
    let variant = match hs.take(3) {
	Some("$5$") => Variant::Sha256,
	Some("$6$") => Variant::Sha512,
	_ => return Ok(None),
    };
    let err = |reason| Error::parse(ALGORITHM, reason);
    let first = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?;
    let (rounds, salt) = match first.strip_prefix(ROUNDS_PREFIX) {
	Some(rounds) => {
	    let rounds = parse::decimal::<u64>("rounds", rounds).map_err(err)?;
	    (rounds, hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?)
	},
	None => (u64::from(DEFAULT_ROUNDS), first),
    };
    let checksum = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("checksum")))?;
    if !hs.at_end() {
	return Err(err(ParseError::TrailingData));
    }
    if checksum.len() != variant.checksum_len() {
	return Err(err(ParseError::FieldLength { field: "checksum", actual: checksum.len() }));
    }
    if crypt3_decode(checksum).is_none() {
	return Err(err(ParseError::Encoding("checksum")));
    }
    Ok(Some(Checker {
	params: Params { variant, rounds: u32::try_from(rounds).unwrap_or(u32::MAX) },
	stored_rounds: rounds,
	salt: truncate_salt(salt.as_bytes()),
	checksum,
    }))
}

impl Checker<'_> {
    fn verify(&self, pass: &str) -> Verdict {
	let rounds = clamp_rounds(self.params.rounds);
	let calc = self.params.variant.checksum(pass.as_bytes(), self.salt, rounds);
	consteq(calc.as_bytes(), self.checksum.as_bytes()).into()
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	let (min, max) = match self.params.variant {
	    Variant::Sha256 => (opts.min_sha256_rounds, opts.max_sha256_rounds),
	    Variant::Sha512 => (opts.min_sha512_rounds, opts.max_sha512_rounds),
	};
	check_bounds(self.params.variant.name(), "rounds", u64::from(min), u64::from(max), self.stored_rounds)
    }
}

/// Verify a password against a SHA-256 or SHA-512 crypt hash.
///
/// Returns `Verdict::Skip` if the hash doesn't start with `$5$` or `$6$`.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_sha2_hash(hash)? {
	Some(c) => Ok(c.verify(pass)),
	None => Ok(Verdict::Skip),
    }
}

/// Bounds for the number of rounds, per digest width.
///
/// Zero values are replaced with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum SHA-256 rounds.
    pub min_sha256_rounds: u32,
    /// Maximum SHA-256 rounds.
    pub max_sha256_rounds: u32,
    /// Minimum SHA-512 rounds.
    pub min_sha512_rounds: u32,
    /// Maximum SHA-512 rounds.
    pub max_sha512_rounds: u32,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts {
	    min_sha256_rounds: MIN_ROUNDS,
	    max_sha256_rounds: MAX_ROUNDS,
	    min_sha512_rounds: MIN_ROUNDS,
	    max_sha512_rounds: MAX_ROUNDS,
	}
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	let dflt = ValidationOpts::default();
	let or = |v: u32, d: u32| if v == 0 { d } else { v };
	ValidationOpts {
	    min_sha256_rounds: or(self.min_sha256_rounds, dflt.min_sha256_rounds),
	    max_sha256_rounds: or(self.max_sha256_rounds, dflt.max_sha256_rounds),
	    min_sha512_rounds: or(self.min_sha512_rounds, dflt.min_sha512_rounds),
	    max_sha512_rounds: or(self.max_sha512_rounds, dflt.max_sha512_rounds),
	}
    }
}

/// Check the rounds of a hash against the bounds.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_sha2_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates SHA-crypt hashes with fixed parameters.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    opts: ValidationOpts,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// SHA-256 hasher with the given number of rounds.
    pub fn sha256(rounds: u32) -> Hasher {
	Hasher::new(Params { variant: Variant::Sha256, rounds })
    }

    /// SHA-512 hasher with the given number of rounds.
    pub fn sha512(rounds: u32) -> Hasher {
	Hasher::new(Params { variant: Variant::Sha512, rounds })
    }

    /// Hasher with the given parameters. The rounds are coerced into the
    /// valid range.
    pub fn new(params: Params) -> Hasher {
	Hasher {
	    params: Params { rounds: clamp_rounds(params.rounds), ..params },
	    opts: ValidationOpts::default(),
	    source: salt::default_source(),
	}
    }

    /// Use custom validation bounds.
    pub fn with_validation(mut self, opts: ValidationOpts) -> Hasher {
	self.opts = opts.checked();
	self
    }

    /// Draw salt from a custom source.
    pub fn with_source(mut self, source: Arc<dyn SaltSource>) -> Hasher {
	self.source = source;
	self
    }

    /// The parameters of generated hashes.
    pub fn params(&self) -> Params {
	self.params
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_sha2_hash(encoded)? {
	    Some(c) => c,
	    None => return Ok(Verdict::Skip),
	};
	match c.verify(password) {
	    Verdict::Ok if c.params != self.params => Ok(Verdict::NeedUpdate),
	    v => Ok(v),
	}
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let raw = salt::new_salt(&*self.source, salt::RECOMMENDED_LEN, ALGORITHM)?;
	let salt = crypt3_encode(&raw);
	Ok(hash_with(self.params, &salt[..MAX_SALT_LEN], password))
    }
}

impl verifier::Validator for Hasher {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, &self.opts)
    }
}
