//! Scrypt in the Modular Crypt Format used by Passlib.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Scrypt is a memory-hard key derivation function. Its cost is set by
//! three parameters: the CPU/memory cost _N_ (stored as its base-2
//! logarithm), the block size _r_, and the parallelism _p_.
//!
//! # Example
//!
//! ```
//! use pwswap::{scrypt, Hasher, Verifier};
//!
//! let h = scrypt::Hasher::new(scrypt::Params { ln: 10, ..scrypt::Params::RECOMMENDED });
//! let hash = h.hash("password").unwrap();
//! assert!(hash.starts_with("$scrypt$ln=10,r=8,p=1$"));
//! assert_eq!(h.verify(&hash, "password").unwrap(), pwswap::Verdict::Ok);
//! ```
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$scrypt$ln=`__*`{ln}`*__`,r=`__*`{r}`*__`,p=`__*`{p}`*__`$`__*`{salt}`*__`$`__*`{checksum}`*,
//! where *`{salt}`* and *`{checksum}`* are standard Base64 without padding.
//! The prefix __`$7$`__ is accepted as an alias on input.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Hash identifier.
pub const IDENTIFIER: &str = "scrypt";
/// Alternative identifier, accepted on input.
pub const IDENTIFIER_LINUX: &str = "7";
/// Default minimum base-2 logarithm of N accepted by validation.
pub const DEFAULT_MIN_LN: u8 = 14;
/// Default maximum base-2 logarithm of N accepted by validation.
pub const DEFAULT_MAX_LN: u8 = 20;
/// Default minimum block size accepted by validation.
pub const DEFAULT_MIN_R: u32 = 8;
/// Default maximum block size accepted by validation.
pub const DEFAULT_MAX_R: u32 = 32;
/// Default minimum parallelism accepted by validation.
pub const DEFAULT_MIN_P: u32 = 1;
/// Default maximum parallelism accepted by validation.
pub const DEFAULT_MAX_P: u32 = 16;
const ALGORITHM: &str = "scrypt";
// Passed to the primitive only to satisfy its checks; the real output
// length is that of the buffer.
const PRIMITIVE_LEN: usize = 32;

/// Cost and length parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Params {
    /// Base-2 logarithm of N, the CPU/memory cost.
    pub ln: u8,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
    /// Length of the derived key in bytes.
    pub key_len: usize,
    /// Length of the salt in bytes.
    pub salt_len: usize,
}

impl Params {
    /// Recommended parameters for interactive logins.
    pub const RECOMMENDED: Params = Params { ln: 15, r: 8, p: 1, key_len: 32, salt_len: 16 };
}

fn derive(pass: &[u8], salt: &[u8], ln: u8, r: u32, p: u32, key_len: usize) -> Result<Vec<u8>> {
    let invalid = |reason: String| Error::InvalidParams { algorithm: ALGORITHM, reason };
    if u64::from(r) * u64::from(p) >= 1 << 30 {
	return Err(invalid("r*p value larger than 2^30".into()));
    }
    let params = ::scrypt::Params::new(ln, r, p, PRIMITIVE_LEN).map_err(|e| invalid(e.to_string()))?;
    let mut key = vec![0u8; key_len];
    ::scrypt::scrypt(pass, salt, &params, &mut key).map_err(|e| invalid(e.to_string()))?;
    Ok(key)
}

struct Checker {
    params: Params,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

fn parse_scrypt_hash(hash: &str) -> Result<Option<Checker>> {
    let mut hs = parse::HashSlice::new(hash);
    hs.take(1);
    match hs.take_until(b'$') {
	Some(IDENTIFIER) | Some(IDENTIFIER_LINUX) if hash.starts_with('$') => (),
	_ => return Ok(None),
    }
    if hs.at_end() {
	return Ok(None);
    }
    let err = |reason: ParseError| Error::parse(ALGORITHM, reason);
    let costs = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("parameters")))?;
    let enc_salt = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?;
    let enc_hash = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("hash")))?;
    if !hs.at_end() {
	return Err(err(ParseError::TrailingData));
    }
    let mut kv = costs.split(',');
    let ln = parse::key_value::<u8>("ln", kv.next()).map_err(err)?;
    let r = parse::key_value::<u32>("r", kv.next()).map_err(err)?;
    let p = parse::key_value::<u32>("p", kv.next()).map_err(err)?;
    if kv.next().is_some() {
	return Err(err(ParseError::TrailingData));
    }
    let salt = STANDARD_NO_PAD.decode(enc_salt)
	.map_err(|source| err(ParseError::Base64 { field: "salt", source }))?;
    let hash = STANDARD_NO_PAD.decode(enc_hash)
	.map_err(|source| err(ParseError::Base64 { field: "hash", source }))?;
    let params = Params { ln, r, p, key_len: hash.len(), salt_len: salt.len() };
    Ok(Some(Checker { params, salt, hash }))
}

impl Checker {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	let Params { ln, r, p, key_len, .. } = self.params;
	let calc = derive(pass.as_bytes(), &self.salt, ln, r, p, key_len)?;
	Ok(consteq(&calc, &self.hash).into())
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	let Params { ln, r, p, .. } = self.params;
	check_bounds(IDENTIFIER, "LN", opts.min_ln, opts.max_ln, ln)?;
	check_bounds(IDENTIFIER, "R", opts.min_r, opts.max_r, r)?;
	check_bounds(IDENTIFIER, "P", opts.min_p, opts.max_p, p)?;
	if u64::from(r) * u64::from(p) >= 1 << 30 {
	    return Err(Error::InvalidParams { algorithm: ALGORITHM, reason: "r*p value larger than 2^30".into() });
	}
	Ok(())
    }
}

/// Verify a password against a scrypt hash.
///
/// Parameters rejected by the primitive yield an `InvalidParams` error.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_scrypt_hash(hash)? {
	Some(c) => c.verify(pass),
	None => Ok(Verdict::Skip),
    }
}

/// Bounds for the cost parameters. Zero values are replaced with the
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum log2 N.
    pub min_ln: u8,
    /// Maximum log2 N.
    pub max_ln: u8,
    /// Minimum block size.
    pub min_r: u32,
    /// Maximum block size.
    pub max_r: u32,
    /// Minimum parallelism.
    pub min_p: u32,
    /// Maximum parallelism.
    pub max_p: u32,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts {
	    min_ln: DEFAULT_MIN_LN,
	    max_ln: DEFAULT_MAX_LN,
	    min_r: DEFAULT_MIN_R,
	    max_r: DEFAULT_MAX_R,
	    min_p: DEFAULT_MIN_P,
	    max_p: DEFAULT_MAX_P,
	}
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	fn or<T: Default + PartialEq>(v: T, dflt: T) -> T {
	    if v == T::default() { dflt } else { v }
	}
	ValidationOpts {
	    min_ln: or(self.min_ln, DEFAULT_MIN_LN),
	    max_ln: or(self.max_ln, DEFAULT_MAX_LN),
	    min_r: or(self.min_r, DEFAULT_MIN_R),
	    max_r: or(self.max_r, DEFAULT_MAX_R),
	    min_p: or(self.min_p, DEFAULT_MIN_P),
	    max_p: or(self.max_p, DEFAULT_MAX_P),
	}
    }
}

/// Check the cost parameters of a hash against the bounds.
///
/// Bounds are checked in the order ln, r, p; only the first violation is
/// reported.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_scrypt_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates scrypt hashes.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    opts: ValidationOpts,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher with the given parameters. They are not checked until the
    /// first hash is produced.
    pub fn new(params: Params) -> Hasher {
	Hasher { params, opts: ValidationOpts::default(), source: salt::default_source() }
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

    /// The parameters of new hashes.
    pub fn params(&self) -> Params {
	self.params
    }
}

impl Default for Hasher {
    fn default() -> Self {
	Hasher::new(Params::RECOMMENDED)
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_scrypt_hash(encoded)? {
	    Some(c) => c,
	    None => return Ok(Verdict::Skip),
	};
	match c.verify(password)? {
	    Verdict::Ok if c.params != self.params => Ok(Verdict::NeedUpdate),
	    v => Ok(v),
	}
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let Params { ln, r, p, key_len, salt_len } = self.params;
	let salt = salt::new_salt(&*self.source, salt_len, ALGORITHM)?;
	let hash = derive(password.as_bytes(), &salt, ln, r, p, key_len)?;
	Ok(format!("${}$ln={},r={},p={}${}${}", IDENTIFIER, ln, r, p,
	    STANDARD_NO_PAD.encode(salt), STANDARD_NO_PAD.encode(hash)))
    }
}

impl verifier::Validator for Hasher {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, &self.opts)
    }
}
