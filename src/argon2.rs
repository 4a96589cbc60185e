//! Argon2 in the PHC string format.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Argon2 won the Password Hashing Competition. Two of its three modes
//! are supported: __argon2i__ and __argon2id__. Hashes in the __argon2d__
//! mode are recognized, but rejected with an `Unsupported` error, since
//! the mode is not meant for password hashing.
//!
//! # Example
//!
//! ```
//! use pwswap::{argon2, Verdict};
//!
//! let h = "$argon2id$v=19$m=4096,t=3,p=1$cmFuZG9tc2FsdGlzaGFyZA$DYojYpnUWSMmTtrkVXyaNWVGxLmGe1n8VJBPDdFkbjU";
//! assert_eq!(argon2::verify(h, "password").unwrap(), Verdict::Ok);
//! ```
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$`__*`{id}`*__`$v=19$m=`__*`{memory}`*__`,t=`__*`{time}`*__`,p=`__*`{threads}`*__`$`__*`{salt}`*__`$`__*`{checksum}`*,
//! where *`{id}`* is __`argon2i`__ or __`argon2id`__, *`{memory}`* is in
//! kibibytes, and *`{salt}`* and *`{checksum}`* are standard Base64 without
//! padding. Only version 19 (0x13) is accepted.
//!
//! # Limits
//!
//! The underlying primitive requires a salt of at least 8 bytes, a checksum
//! of at least 4 bytes, and at least 8 KiB of memory per thread. Hashes
//! which parse, but fall short of these limits, are rejected with an
//! `InvalidParams` error when verified; validation only looks at the cost
//! bounds.

use std::sync::Arc;

use ::argon2::{Algorithm, Argon2, Version};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Common prefix of all modes.
pub const PREFIX: &str = "$argon2";
/// Identifier of Argon2i.
pub const IDENTIFIER_I: &str = "argon2i";
/// Identifier of Argon2id.
pub const IDENTIFIER_ID: &str = "argon2id";
/// Identifier of Argon2d, which is not supported.
pub const IDENTIFIER_D: &str = "argon2d";
/// The only supported version.
pub const VERSION: u32 = 0x13;
/// Default minimum time cost accepted by validation.
pub const DEFAULT_MIN_TIME: u32 = 1;
/// Default maximum time cost accepted by validation.
pub const DEFAULT_MAX_TIME: u32 = 10;
/// Default minimum memory cost, in KiB, accepted by validation.
pub const DEFAULT_MIN_MEMORY: u32 = 1024;
/// Default maximum memory cost, in KiB, accepted by validation.
pub const DEFAULT_MAX_MEMORY: u32 = 4 * 1024 * 1024;
/// Default minimum number of threads accepted by validation.
pub const DEFAULT_MIN_THREADS: u8 = 1;
/// Default maximum number of threads accepted by validation.
pub const DEFAULT_MAX_THREADS: u8 = 16;
/// Shortest salt, in bytes, which can be verified or generated.
pub const MIN_SALT_LEN: usize = 8;
/// Shortest checksum, in bytes, which can be verified or generated.
pub const MIN_KEY_LEN: usize = 4;
const MIN_MEMORY_PER_THREAD: u32 = 8;
const ALGORITHM: &str = "argon2";

/// Argon2 modes which can be verified and produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Data-independent memory access.
    I,
    /// Hybrid of data-dependent and data-independent access.
    Id,
}

impl Variant {
    fn ident(self) -> &'static str {
	match self {
	    Variant::I => IDENTIFIER_I,
	    Variant::Id => IDENTIFIER_ID,
	}
    }

    fn algorithm(self) -> Algorithm {
	match self {
	    Variant::I => Algorithm::Argon2i,
	    Variant::Id => Algorithm::Argon2id,
	}
    }
}

/// Cost and length parameters, including the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Params {
    /// Number of passes.
    pub time: u32,
    /// Memory size in KiB.
    pub memory: u32,
    /// Degree of parallelism.
    pub threads: u8,
    /// Length of the derived key in bytes.
    pub key_len: usize,
    /// Length of the salt in bytes.
    pub salt_len: usize,
    /// Mode.
    pub variant: Variant,
}

impl Params {
    /// Recommended Argon2id parameters: one pass over 64 MiB with four lanes.
    pub const RECOMMENDED_ID: Params = Params {
	time: 1,
	memory: 64 * 1024,
	threads: 4,
	key_len: 32,
	salt_len: 16,
	variant: Variant::Id,
    };

    /// Recommended Argon2i parameters: three passes over 32 MiB with four lanes.
    pub const RECOMMENDED_I: Params = Params {
	time: 3,
	memory: 32 * 1024,
	threads: 4,
	key_len: 32,
	salt_len: 16,
	variant: Variant::I,
    };
}

fn derive(pass: &[u8], salt: &[u8], params: &Params) -> Result<Vec<u8>> {
    let limit = |reason: String| Error::InvalidParams { algorithm: ALGORITHM, reason };
    if salt.len() < MIN_SALT_LEN {
	return Err(limit(format!("salt length {} below minimum {}", salt.len(), MIN_SALT_LEN)));
    }
    if params.key_len < MIN_KEY_LEN {
	return Err(limit(format!("hash length {} below minimum {}", params.key_len, MIN_KEY_LEN)));
    }
    if params.memory < MIN_MEMORY_PER_THREAD * u32::from(params.threads) {
	return Err(limit(format!("memory {} KiB below minimum {} KiB for {} threads",
	    params.memory, MIN_MEMORY_PER_THREAD * u32::from(params.threads), params.threads)));
    }
    let invalid = |e: ::argon2::Error| Error::InvalidParams { algorithm: ALGORITHM, reason: e.to_string() };
    let cost = ::argon2::Params::new(params.memory, params.time, params.threads.into(), None).map_err(invalid)?;
    let ctx = Argon2::new(params.variant.algorithm(), Version::V0x13, cost);
    let mut key = vec![0u8; params.key_len];
    ctx.hash_password_into(pass, salt, &mut key).map_err(invalid)?;
    Ok(key)
}

struct Checker {
    params: Params,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

fn parse_argon2_hash(hash: &str) -> Result<Option<Checker>> {
    if !hash.starts_with(PREFIX) {
	return Ok(None);
    }
    let err = |reason: ParseError| Error::parse(ALGORITHM, reason);
    let mut hs = parse::HashSlice::new(hash);
    hs.take(1);
    let id = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("identifier")))?;
    let version = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("version")))?;
    let costs = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("parameters")))?;
    let enc_salt = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?;
    let enc_hash = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("hash")))?;
    if !hs.at_end() {
	return Err(err(ParseError::TrailingData));
    }
    let version = parse::key_value::<u32>("v", Some(version)).map_err(err)?;
    let mut kv = costs.split(',');
    let memory = parse::key_value::<u32>("m", kv.next()).map_err(err)?;
    let time = parse::key_value::<u32>("t", kv.next()).map_err(err)?;
    let threads = parse::key_value::<u8>("p", kv.next()).map_err(err)?;
    if kv.next().is_some() {
	return Err(err(ParseError::TrailingData));
    }
    let variant = match id {
	IDENTIFIER_I => Variant::I,
	IDENTIFIER_ID => Variant::Id,
	IDENTIFIER_D => return Err(Error::Unsupported { algorithm: ALGORITHM, variant: id.to_owned() }),
	_ => return Err(err(ParseError::UnknownIdentifier(id.to_owned()))),
    };
    if version != VERSION {
	return Err(err(ParseError::Version(version)));
    }
    let salt = STANDARD_NO_PAD.decode(enc_salt)
	.map_err(|source| err(ParseError::Base64 { field: "salt", source }))?;
    let hash = STANDARD_NO_PAD.decode(enc_hash)
	.map_err(|source| err(ParseError::Base64 { field: "hash", source }))?;
    let params = Params { time, memory, threads, key_len: hash.len(), salt_len: salt.len(), variant };
    Ok(Some(Checker { params, salt, hash }))
}

impl Checker {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	let calc = derive(pass.as_bytes(), &self.salt, &self.params)?;
	Ok(consteq(&calc, &self.hash).into())
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	let Params { time, memory, threads, .. } = self.params;
	check_bounds(ALGORITHM, "time", opts.min_time, opts.max_time, time)?;
	check_bounds(ALGORITHM, "memory", opts.min_memory, opts.max_memory, memory)?;
	check_bounds(ALGORITHM, "threads", opts.min_threads, opts.max_threads, threads)
    }
}

/// Verify a password against an Argon2 hash.
///
/// Argon2d hashes yield an `Unsupported` error.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_argon2_hash(hash)? {
	Some(c) => c.verify(pass),
	None => Ok(Verdict::Skip),
    }
}

/// Bounds for the cost parameters. Zero values are replaced with the
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum passes.
    pub min_time: u32,
    /// Maximum passes.
    pub max_time: u32,
    /// Minimum memory in KiB.
    pub min_memory: u32,
    /// Maximum memory in KiB.
    pub max_memory: u32,
    /// Minimum parallelism.
    pub min_threads: u8,
    /// Maximum parallelism.
    pub max_threads: u8,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts {
	    min_time: DEFAULT_MIN_TIME,
	    max_time: DEFAULT_MAX_TIME,
	    min_memory: DEFAULT_MIN_MEMORY,
	    max_memory: DEFAULT_MAX_MEMORY,
	    min_threads: DEFAULT_MIN_THREADS,
	    max_threads: DEFAULT_MAX_THREADS,
	}
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	let dflt = ValidationOpts::default();
	ValidationOpts {
	    min_time: if self.min_time == 0 { dflt.min_time } else { self.min_time },
	    max_time: if self.max_time == 0 { dflt.max_time } else { self.max_time },
	    min_memory: if self.min_memory == 0 { dflt.min_memory } else { self.min_memory },
	    max_memory: if self.max_memory == 0 { dflt.max_memory } else { self.max_memory },
	    min_threads: if self.min_threads == 0 { dflt.min_threads } else { self.min_threads },
	    max_threads: if self.max_threads == 0 { dflt.max_threads } else { self.max_threads },
	}
    }
}

/// Check the cost parameters of a hash against the bounds, in the order
/// time, memory, threads.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_argon2_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates Argon2 hashes.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    opts: ValidationOpts,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Argon2id hasher. The mode in `params` is overridden.
    pub fn id(params: Params) -> Hasher {
	Hasher::new(Params { variant: Variant::Id, ..params })
    }

    /// Argon2i hasher. The mode in `params` is overridden.
    pub fn i(params: Params) -> Hasher {
	Hasher::new(Params { variant: Variant::I, ..params })
    }

    /// Hasher with the mode given in `params`.
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

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_argon2_hash(encoded)? {
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
	let p = &self.params;
	let salt = salt::new_salt(&*self.source, p.salt_len, ALGORITHM)?;
	let hash = derive(password.as_bytes(), &salt, p)?;
	Ok(format!("${}$v={}$m={},t={},p={}${}${}", p.variant.ident(), VERSION, p.memory, p.time, p.threads,
	    STANDARD_NO_PAD.encode(salt), STANDARD_NO_PAD.encode(hash)))
    }
}

impl verifier::Validator for Hasher {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, &self.opts)
    }
}
