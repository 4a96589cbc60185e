//! MD5 based hash.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! This algorithm was developed for FreeBSD to replace the
//! aging DES crypt. It was adopted in various Linux distributions
//! and saw wide use. Presently, it's considered insecure and
//! shouldn't be used for new passwords; it's supported for
//! verification of legacy hashes.
//!
//! # Example
//!
//! ```
//! use pwswap::{md5_crypt, Verdict};
//!
//! assert_eq!(md5_crypt::verify(
//!     "$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1",
//!     "password").unwrap(),
//!     Verdict::Ok);
//! ```
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt length__: any, used verbatim. Other implementations truncate
//!   salts to 8 characters, which is all they generate; so does this
//!   module, encoding 6 random bytes.
//!
//! * __Rounds__: 1000 (fixed.)
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$1$`__*`{salt}`*__$__*`{checksum}`*, where:
//!
//! * *`{salt}`* is the salt string.
//!
//! * *`{checksum}`* is a 22-character Base64 encoding of the checksum.

use std::cmp::min;
use std::sync::Arc;

use md5::{Digest, Md5};

use crate::enc_dec::{crypt3_decode, crypt3_encode};
use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, Verdict};
use crate::{consteq, Result};

/// Prefix of all MD5-crypt hashes.
pub const PREFIX: &str = "$1$";
const ALGORITHM: &str = "md5";
const SALT_BYTES: usize = 6;
const CHECKSUM_LEN: usize = 22;
const MD5_TRANSPOSE: &[u8] = b"\x0c\x06\x00\x0d\x07\x01\x0e\x08\x02\x0f\x09\x03\x05\x0a\x04\x0b";

fn md5_crypt(pass: &[u8], salt: &[u8]) -> String {
    let mut dgst_b = Md5::new();
    dgst_b.update(pass);
    dgst_b.update(salt);
    dgst_b.update(pass);
    let hash_b = dgst_b.finalize();

    let mut dgst_a = Md5::new();
    dgst_a.update(pass);
    dgst_a.update(PREFIX.as_bytes());
    dgst_a.update(salt);

    let mut plen = pass.len();
    while plen > 0 {
	dgst_a.update(&hash_b[..min(plen, 16)]);
	if plen < 16 {
	    break;
	}
	plen -= 16;
    }

    plen = pass.len();
    while plen > 0 {
	match plen & 1 {
	    0 => dgst_a.update(&pass[..1]),
	    _ => dgst_a.update([0u8]),
	}
	plen >>= 1;
    }

    let mut hash_a = dgst_a.finalize();

    for r in 0..1000 {
	let mut dgst_a = Md5::new();
	if r % 2 == 1 {
	    dgst_a.update(pass);
	} else {
	    dgst_a.update(&hash_a);
	}
	if r % 3 > 0 {
	    dgst_a.update(salt);
	}
	if r % 7 > 0 {
	    dgst_a.update(pass);
	}
	if r % 2 == 0 {
	    dgst_a.update(pass);
	} else {
	    dgst_a.update(&hash_a);
	}
	hash_a = dgst_a.finalize();
    }

    let mut swapped = [0u8; 16];
    for (i, &ti) in MD5_TRANSPOSE.iter().enumerate() {
	swapped[i] = hash_a[ti as usize];
    }
    crypt3_encode(&swapped)
}

struct Checker<'a> {
    salt: &'a str,
    checksum: &'a str,
}

fn parse_md5_hash(hash: &str) -> Result<Option<Checker>> {
    let mut hs = parse::HashSlice::new(hash);
    if hs.take(PREFIX.len()) != Some(PREFIX) {
	return Ok(None);
    }
    let err = |reason| Error::parse(ALGORITHM, reason);
    let salt = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?;
    if crypt3_decode(salt).is_none() {
	return Err(err(ParseError::Encoding("salt")));
    }
    let checksum = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("checksum")))?;
    if !hs.at_end() {
	return Err(err(ParseError::TrailingData));
    }
    if checksum.len() != CHECKSUM_LEN {
	return Err(err(ParseError::FieldLength { field: "checksum", actual: checksum.len() }));
    }
    if crypt3_decode(checksum).is_none() {
	return Err(err(ParseError::Encoding("checksum")));
    }
    Ok(Some(Checker { salt, checksum }))
}

impl Checker<'_> {
    fn verify(&self, pass: &str) -> Verdict {
	let calc = md5_crypt(pass.as_bytes(), self.salt.as_bytes());
	consteq(calc.as_bytes(), self.checksum.as_bytes()).into()
    }
}

/// Verify a password against an MD5-crypt hash.
///
/// Returns `Verdict::Skip` if the hash doesn't start with `$1$`.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_md5_hash(hash)? {
	Some(c) => Ok(c.verify(pass)),
	None => Ok(Verdict::Skip),
    }
}

/// Generates MD5-crypt hashes.
///
/// The algorithm has no tunable parameters, so verification through the
/// hasher never asks for an update.
#[derive(Clone)]
pub struct Hasher {
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher drawing salt from the system random number generator.
    pub fn new() -> Hasher {
	Hasher { source: salt::default_source() }
    }

    /// Hasher drawing salt from a custom source.
    pub fn with_source(source: Arc<dyn SaltSource>) -> Hasher {
	Hasher { source }
    }
}

impl Default for Hasher {
    fn default() -> Self {
	Hasher::new()
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	verify(encoded, password)
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let raw = salt::new_salt(&*self.source, SALT_BYTES, ALGORITHM)?;
	let salt = crypt3_encode(&raw);
	let checksum = md5_crypt(password.as_bytes(), salt.as_bytes());
	Ok(format!("{}{}${}", PREFIX, salt, checksum))
    }
}

#[cfg(test)]
mod tests {
    use super::{verify, Hasher};
    use crate::error::Error;
    use crate::salt::{FailingSource, FixedSalt};
    use crate::verifier::Hasher as _;
    use crate::Verdict;
    use rstest::rstest;
    use std::sync::Arc;

    #[test]
    fn hash_with_fixed_salt() {
	let h = Hasher::with_source(Arc::new(FixedSalt(b"pepper".to_vec())));
	assert_eq!(h.hash("password").unwrap(), "$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1");
    }

    #[test]
    fn salt_failure() {
	let h = Hasher::with_source(Arc::new(FailingSource));
	assert!(matches!(h.hash("password"), Err(Error::Random { algorithm: "md5", .. })));
    }

    #[test]
    fn fresh_hash_verifies() {
	let h = Hasher::new();
	let enc = h.hash("correct horse").unwrap();
	assert_eq!(verify(&enc, "correct horse").unwrap(), Verdict::Ok);
	assert_eq!(verify(&enc, "correct horsf").unwrap(), Verdict::Fail);
    }

    #[rstest]
    #[case("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1", "password", Verdict::Ok)]
    #[case("$1$5pZSV9va$azfrPr6af3Fc7dLblQXVa0", "password", Verdict::Ok)]
    #[case("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1", "passwork", Verdict::Fail)]
    #[case("$2b$12$bIRGj4QPPoSUMWsJE.4Pk.T1qTpDWz7HhMnuiQhGzGinKPsx/HQdq", "password", Verdict::Skip)]
    #[case("$1$kJ4QkJaQxxyy$6ZG10bhMh5kKbmKpUGYej.", "password", Verdict::Ok)]
    #[case("$1$kJ4QkJaQxxyy$3EbD/pJddrq5HW3mpZ4KZ1", "password", Verdict::Fail)]
    #[case("", "password", Verdict::Skip)]
    fn verification(#[case] hash: &str, #[case] pass: &str, #[case] want: Verdict) {
	assert_eq!(verify(hash, pass).unwrap(), want);
    }

    #[rstest]
    #[case("$1$")]
    #[case("$1$kJ4QkJaQ")]
    #[case("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ")]
    #[case("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1$")]
    #[case("$1$kJ4Q-JaQ$3EbD/pJddrq5HW3mpZ4KZ1")]
    fn malformed(#[case] hash: &str) {
	let err = verify(hash, "password").unwrap_err();
	assert_eq!(err.verdict(), Verdict::Skip);
    }
}
