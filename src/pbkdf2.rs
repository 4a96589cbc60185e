//! PBKDF2 in the Modular Crypt Format used by Passlib.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! PBKDF2 (RFC 8018) iterates an HMAC over the password and salt. Any of
//! SHA-1, SHA-224, SHA-256, SHA-384, and SHA-512 can serve as the HMAC
//! digest; the choice is recorded in the identifier.
//!
//! # Example
//!
//! ```
//! use pwswap::{pbkdf2, Verdict};
//!
//! let h = "$pbkdf2-sha256$12$cmFuZG9tc2FsdGlzaGFyZA$OFvEcLOIPFd/oq8egf10i.qJLI7A8nDjPLnolCWarQY";
//! assert_eq!(pbkdf2::verify(h, "password").unwrap(), Verdict::Ok);
//! ```
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$`__*`{id}`*__`$`__*`{rounds}`*__`$`__*`{salt}`*__`$`__*`{checksum}`*, where:
//!
//! * *`{id}`* is __`pbkdf2`__ for SHA-1, or __`pbkdf2-sha224`__,
//!   __`pbkdf2-sha256`__, __`pbkdf2-sha384`__, or __`pbkdf2-sha512`__.
//!
//! * *`{rounds}`* is the decimal iteration count.
//!
//! * *`{salt}`* and *`{checksum}`* use Passlib's variant of Base64, with
//!   `.` instead of `+` and no padding. Standard Base64, with or without
//!   padding, is accepted on input.

use std::sync::Arc;

use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::enc_dec::{ab64_decode, ab64_encode};
use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource, RECOMMENDED_LEN};
use crate::verifier::{self, check_bounds, validation_verdict, Verdict};
use crate::{consteq, Result};

/// Common prefix of all identifiers.
pub const PREFIX: &str = "$pbkdf2";
/// Recommended iteration count.
pub const RECOMMENDED_ROUNDS: u32 = 290000;
/// Default minimum iteration count accepted by validation.
pub const DEFAULT_MIN_ROUNDS: u32 = 1000;
/// Default maximum iteration count accepted by validation.
pub const DEFAULT_MAX_ROUNDS: u32 = 10_000_000;
const ALGORITHM: &str = "pbkdf2";

/// HMAC digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunc {
    /// SHA-1, identified as `pbkdf2`.
    Sha1,
    /// SHA-224, identified as `pbkdf2-sha224`.
    Sha224,
    /// SHA-256, identified as `pbkdf2-sha256`.
    Sha256,
    /// SHA-384, identified as `pbkdf2-sha384`.
    Sha384,
    /// SHA-512, identified as `pbkdf2-sha512`.
    Sha512,
}

impl HashFunc {
    /// The identifier of hashes using this digest.
    pub fn ident(self) -> &'static str {
	match self {
	    HashFunc::Sha1 => "pbkdf2",
	    HashFunc::Sha224 => "pbkdf2-sha224",
	    HashFunc::Sha256 => "pbkdf2-sha256",
	    HashFunc::Sha384 => "pbkdf2-sha384",
	    HashFunc::Sha512 => "pbkdf2-sha512",
	}
    }

    fn from_ident(id: &str) -> Option<HashFunc> {
	[HashFunc::Sha1, HashFunc::Sha224, HashFunc::Sha256, HashFunc::Sha384, HashFunc::Sha512]
	    .into_iter()
	    .find(|hf| hf.ident() == id)
    }

    /// Digest size in bytes.
    pub const fn size(self) -> usize {
	match self {
	    HashFunc::Sha1 => 20,
	    HashFunc::Sha224 => 28,
	    HashFunc::Sha256 => 32,
	    HashFunc::Sha384 => 48,
	    HashFunc::Sha512 => 64,
	}
    }

    fn derive(self, pass: &[u8], salt: &[u8], rounds: u32, key: &mut [u8]) {
	use ::pbkdf2::pbkdf2_hmac;
	match self {
	    HashFunc::Sha1 => pbkdf2_hmac::<Sha1>(pass, salt, rounds, key),
	    HashFunc::Sha224 => pbkdf2_hmac::<Sha224>(pass, salt, rounds, key),
	    HashFunc::Sha256 => pbkdf2_hmac::<Sha256>(pass, salt, rounds, key),
	    HashFunc::Sha384 => pbkdf2_hmac::<Sha384>(pass, salt, rounds, key),
	    HashFunc::Sha512 => pbkdf2_hmac::<Sha512>(pass, salt, rounds, key),
	}
    }
}

/// Iteration count, lengths, and digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Params {
    /// Iteration count.
    pub rounds: u32,
    /// Length of the derived key in bytes.
    pub key_len: usize,
    /// Length of the salt in bytes.
    pub salt_len: usize,
    /// HMAC digest.
    pub hash_func: HashFunc,
}

impl Params {
    /// Passlib's defaults for the digest: 290000 rounds, 16 bytes of salt,
    /// and a key as long as the digest.
    pub const fn recommended(hash_func: HashFunc) -> Params {
	Params { rounds: RECOMMENDED_ROUNDS, key_len: hash_func.size(), salt_len: RECOMMENDED_LEN, hash_func }
    }

    fn derive(&self, pass: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
	if self.rounds == 0 {
	    return Err(Error::InvalidParams { algorithm: ALGORITHM, reason: "zero rounds".into() });
	}
	let mut key = vec![0u8; self.key_len];
	self.hash_func.derive(pass, salt, self.rounds, &mut key);
	Ok(key)
    }
}

struct Checker {
    params: Params,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

fn parse_pbkdf2_hash(hash: &str) -> Result<Option<Checker>> {
    if !hash.starts_with(PREFIX) {
	return Ok(None);
    }
    let err = |reason: ParseError| Error::parse(ALGORITHM, reason);
    let mut hs = parse::HashSlice::new(hash);
    hs.take(1);
    let id = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("identifier")))?;
    let rounds = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("rounds")))?;
    let enc_salt = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?;
    let enc_hash = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("hash")))?;
    if !hs.at_end() {
	return Err(err(ParseError::TrailingData));
    }
    let rounds = parse::decimal::<u32>("rounds", rounds).map_err(err)?;
    let hash_func = HashFunc::from_ident(id).ok_or_else(|| err(ParseError::UnknownIdentifier(id.to_owned())))?;
    let salt = ab64_decode(enc_salt).map_err(|source| err(ParseError::Base64 { field: "salt", source }))?;
    let hash = ab64_decode(enc_hash).map_err(|source| err(ParseError::Base64 { field: "hash", source }))?;
    if hash.is_empty() {
	return Err(err(ParseError::FieldLength { field: "hash", actual: 0 }));
    }
    let params = Params { rounds, key_len: hash.len(), salt_len: salt.len(), hash_func };
    Ok(Some(Checker { params, salt, hash }))
}

impl Checker {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	let calc = self.params.derive(pass.as_bytes(), &self.salt)?;
	Ok(consteq(&calc, &self.hash).into())
    }

    fn validate(&self, opts: &ValidationOpts) -> Result<()> {
	check_bounds(ALGORITHM, "rounds", opts.min_rounds, opts.max_rounds, self.params.rounds)
    }
}

/// Verify a password against a PBKDF2 hash. The HMAC digest is selected by
/// the identifier.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_pbkdf2_hash(hash)? {
	Some(c) => c.verify(pass),
	None => Ok(Verdict::Skip),
    }
}

/// Bounds for the iteration count. Zero values are replaced with the
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOpts {
    /// Minimum rounds.
    pub min_rounds: u32,
    /// Maximum rounds.
    pub max_rounds: u32,
}

impl Default for ValidationOpts {
    fn default() -> Self {
	ValidationOpts { min_rounds: DEFAULT_MIN_ROUNDS, max_rounds: DEFAULT_MAX_ROUNDS }
    }
}

impl ValidationOpts {
    /// Replace unset (zero) bounds with defaults.
    pub fn checked(self) -> Self {
	ValidationOpts {
	    min_rounds: if self.min_rounds == 0 { DEFAULT_MIN_ROUNDS } else { self.min_rounds },
	    max_rounds: if self.max_rounds == 0 { DEFAULT_MAX_ROUNDS } else { self.max_rounds },
	}
    }
}

/// Check the iteration count of a hash against the bounds.
pub fn validate(hash: &str, opts: &ValidationOpts) -> Result<Verdict> {
    let opts = opts.checked();
    validation_verdict(parse_pbkdf2_hash(hash), |c| c.validate(&opts))
}

impl verifier::Validator for ValidationOpts {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, self)
    }
}

/// Generates PBKDF2 hashes.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    opts: ValidationOpts,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher with the digest given in `params`.
    pub fn new(params: Params) -> Hasher {
	Hasher { params, opts: ValidationOpts::default(), source: salt::default_source() }
    }

    /// HMAC-SHA-1 hasher. The digest in `params` is overridden.
    pub fn sha1(params: Params) -> Hasher {
	Hasher::new(Params { hash_func: HashFunc::Sha1, ..params })
    }

    /// HMAC-SHA-224 hasher. The digest in `params` is overridden.
    pub fn sha224(params: Params) -> Hasher {
	Hasher::new(Params { hash_func: HashFunc::Sha224, ..params })
    }

    /// HMAC-SHA-256 hasher. The digest in `params` is overridden.
    pub fn sha256(params: Params) -> Hasher {
	Hasher::new(Params { hash_func: HashFunc::Sha256, ..params })
    }

    /// HMAC-SHA-384 hasher. The digest in `params` is overridden.
    pub fn sha384(params: Params) -> Hasher {
	Hasher::new(Params { hash_func: HashFunc::Sha384, ..params })
    }

    /// HMAC-SHA-512 hasher. The digest in `params` is overridden.
    pub fn sha512(params: Params) -> Hasher {
	Hasher::new(Params { hash_func: HashFunc::Sha512, ..params })
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
	let c = match parse_pbkdf2_hash(encoded)? {
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
	let salt = salt::new_salt(&*self.source, self.params.salt_len, ALGORITHM)?;
	let hash = self.params.derive(password.as_bytes(), &salt)?;
	Ok(format!("${}${}${}${}", self.params.hash_func.ident(), self.params.rounds,
	    ab64_encode(&salt), ab64_encode(&hash)))
    }
}

impl verifier::Validator for Hasher {
    fn validate(&self, encoded: &str) -> Result<Verdict> {
	validate(encoded, &self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::{validate, verify, HashFunc, Hasher, Params, ValidationOpts};
    use crate::error::{Error, ParseError};
    use crate::salt::{FailingSource, FixedSalt};
    use crate::verifier::{Hasher as _, Verifier as _};
    use crate::Verdict;
    use rstest::rstest;
    use std::sync::Arc;

    const SHA1: &str = "$pbkdf2$12$cmFuZG9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk";
    const SHA256: &str = "$pbkdf2-sha256$12$cmFuZG9tc2FsdGlzaGFyZA$OFvEcLOIPFd/oq8egf10i.qJLI7A8nDjPLnolCWarQY";
    const SHA512: &str = "$pbkdf2-sha512$12$cmFuZG9tc2FsdGlzaGFyZA$e297piXvkpYxoYQAWD9zn1aKXCo3XmR91Xn9/WEGsHXU/7xaQzCV9upu4T5Jntq6AiZ6YX0diXnY7Ju5TEfUMA";
    const SHA256_STD: &str = "$pbkdf2-sha256$12$cmFuZG9tc2FsdGlzaGFyZA$OFvEcLOIPFd/oq8egf10i+qJLI7A8nDjPLnolCWarQY";
    const SHA256_STD_PADDED: &str = "$pbkdf2-sha256$12$cmFuZG9tc2FsdGlzaGFyZA==$OFvEcLOIPFd/oq8egf10i+qJLI7A8nDjPLnolCWarQY=";

    fn test_params(hash_func: HashFunc) -> Params {
	Params { rounds: 12, key_len: hash_func.size(), salt_len: 16, hash_func }
    }

    #[rstest]
    #[case(SHA1, "password", Verdict::Ok)]
    #[case(SHA256, "password", Verdict::Ok)]
    #[case(SHA512, "password", Verdict::Ok)]
    #[case(SHA256_STD, "password", Verdict::Ok)]
    #[case(SHA256_STD_PADDED, "password", Verdict::Ok)]
    #[case(SHA256, "passwore", Verdict::Fail)]
    #[case(SHA1, "", Verdict::Fail)]
    #[case("$argon2id$v=19$m=4096,t=3,p=1$cmFuZG9tc2FsdGlzaGFyZA$DYojYpnUWSMmTtrkVXyaNWVGxLmGe1n8VJBPDdFkbjU", "password", Verdict::Skip)]
    fn verification(#[case] hash: &str, #[case] pass: &str, #[case] want: Verdict) {
	assert_eq!(verify(hash, pass).unwrap(), want);
    }

    #[rstest]
    #[case("$pbkdf2$12$cmFuZG9tc2FsdGlzaGFyZA")]
    #[case("$pbkdf2-md5$12$cmFuZG9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk")]
    #[case("$pbkdf2$-12$cmFuZG9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk")]
    #[case("$pbkdf2$12$cmFuZG9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk$")]
    #[case("$pbkdf2$12$cmFu!G9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk")]
    #[case("$pbkdf2$12$cmFuZG9tc2FsdGlzaGFyZA$")]
    fn malformed(#[case] hash: &str) {
	let err = verify(hash, "password").unwrap_err();
	assert!(matches!(err, Error::Parse { .. }), "{}", err);
	assert_eq!(err.verdict(), Verdict::Skip);
    }

    #[test]
    fn unknown_digest() {
	assert!(matches!(verify("$pbkdf2-md5$12$cmFuZG9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk", "password"),
	    Err(Error::Parse { reason: ParseError::UnknownIdentifier(_), .. })));
    }

    #[test]
    fn zero_rounds() {
	let err = verify("$pbkdf2$0$cmFuZG9tc2FsdGlzaGFyZA$mwUqsMixIYMc/0eN4v1.l3SVDpk", "password").unwrap_err();
	assert!(matches!(err, Error::InvalidParams { .. }));
	assert_eq!(err.verdict(), Verdict::Fail);
    }

    #[rstest]
    #[case(HashFunc::Sha1, SHA1)]
    #[case(HashFunc::Sha256, SHA256)]
    #[case(HashFunc::Sha512, SHA512)]
    fn hasher(#[case] hash_func: HashFunc, #[case] want: &str) {
	let h = Hasher::new(test_params(hash_func)).with_source(Arc::new(FixedSalt(b"randomsaltishard".to_vec())));
	assert_eq!(h.hash("password").unwrap(), want);
	assert_eq!(h.verify(want, "password").unwrap(), Verdict::Ok);
	assert_eq!(h.verify(SHA256_STD_PADDED, "password").unwrap(),
	    if hash_func == HashFunc::Sha256 { Verdict::Ok } else { Verdict::NeedUpdate });
    }

    #[test]
    fn hasher_upgrades() {
	let h = Hasher::sha256(test_params(HashFunc::Sha256));
	assert_eq!(h.verify(SHA1, "password").unwrap(), Verdict::NeedUpdate);
	assert_eq!(h.verify(SHA1, "passwore").unwrap(), Verdict::Fail);
	let h = Hasher::sha256(Params { rounds: 13, ..test_params(HashFunc::Sha256) });
	assert_eq!(h.verify(SHA256, "password").unwrap(), Verdict::NeedUpdate);
	for hf in [HashFunc::Sha224, HashFunc::Sha384] {
	    let h = Hasher::new(test_params(hf));
	    let hash = h.hash("password").unwrap();
	    assert!(hash.starts_with(&format!("${}$12$", hf.ident())));
	    assert_eq!(h.verify(&hash, "password").unwrap(), Verdict::Ok);
	}
	let h = Hasher::sha512(Params::recommended(HashFunc::Sha1)).with_source(Arc::new(FailingSource));
	assert_eq!(h.params().key_len, 20);
	assert!(matches!(h.hash("password"), Err(Error::Random { .. })));
    }

    #[test]
    fn validation() {
	let opts = ValidationOpts { min_rounds: 10, max_rounds: 12 };
	assert_eq!(validate(SHA1, &opts).unwrap(), Verdict::Ok);
	match validate(SHA1, &ValidationOpts::default()) {
	    Err(Error::Bounds(b)) => assert_eq!((b.param, b.min, b.actual), ("rounds", 1000, 12)),
	    other => panic!("unexpected {:?}", other),
	}
	assert!(matches!(validate(SHA1, &ValidationOpts { min_rounds: 1, max_rounds: 11 }), Err(Error::Bounds(_))));
	assert_eq!(validate("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1", &opts).unwrap(), Verdict::Skip);
    }
}
