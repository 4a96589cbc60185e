//! Salted MD5 digest.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! A single MD5 digest over the password concatenated with a salt string,
//! the salt being either appended or prepended. Common in hand-rolled
//! legacy user tables; hashes exported from such tables are framed as
//! shown below.
//!
//! # Example
//!
//! ```
//! use pwswap::{md5_salted, Verdict};
//!
//! let h = "$md5salted-suffix$c2FsdA==$R58+SD/95ORa9VZ9BPS5FA==";
//! assert_eq!(md5_salted::verify(h, "Test1000!").unwrap(), Verdict::Ok);
//! ```
//!
//! # Hash Format
//!
//! The format of the hash is
//! __`$`__*`{id}`*__`$`__*`{salt}`*__`$`__*`{checksum}`*, where:
//!
//! * *`{id}`* is __`md5salted-suffix`__ for MD5(password + salt), or
//!   __`md5salted-prefix`__ for MD5(salt + password).
//!
//! * *`{salt}`* is the salt, used verbatim.
//!
//! * *`{checksum}`* is the standard Base64 encoding of the digest, with
//!   padding.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};

use crate::error::{Error, ParseError};
use crate::parse::{self, HashIterator};
use crate::salt::{self, SaltSource};
use crate::verifier::{self, Verdict};
use crate::{consteq, Result};

/// Common prefix of both variants.
pub const PREFIX: &str = "$md5salted";
/// Identifier of the salt-after-password variant.
pub const IDENTIFIER_SUFFIXED: &str = "md5salted-suffix";
/// Identifier of the salt-before-password variant.
pub const IDENTIFIER_PREFIXED: &str = "md5salted-prefix";
const ALGORITHM: &str = "md5salted";
const SALT_BYTES: usize = 12;

/// Placement of the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// MD5(password + salt).
    Suffix,
    /// MD5(salt + password).
    Prefix,
}

impl Variant {
    fn ident(self) -> &'static str {
	match self {
	    Variant::Suffix => IDENTIFIER_SUFFIXED,
	    Variant::Prefix => IDENTIFIER_PREFIXED,
	}
    }

    fn digest(self, salt: &[u8], pass: &[u8]) -> [u8; 16] {
	let (first, second) = match self {
	    Variant::Suffix => (pass, salt),
	    Variant::Prefix => (salt, pass),
	};
	Md5::new().chain_update(first).chain_update(second).finalize().into()
    }
}

struct Checker<'a> {
    variant: Variant,
    salt: &'a str,
    checksum: &'a str,
}

fn parse_md5salted_hash(hash: &str) -> Result<Option<Checker>> {
    if !hash.starts_with(PREFIX) {
	return Ok(None);
    }
    let err = |reason| Error::parse(ALGORITHM, reason);
    let mut hs = parse::HashSlice::new(hash);
    hs.take(1);
    let id = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("identifier")))?;
    let salt = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("salt")))?;
    let checksum = hs.take_until(b'$').ok_or_else(|| err(ParseError::MissingField("checksum")))?;
    if !hs.at_end() {
	return Err(err(ParseError::TrailingData));
    }
    let variant = match id {
	IDENTIFIER_SUFFIXED => Variant::Suffix,
	IDENTIFIER_PREFIXED => Variant::Prefix,
	_ => return Err(err(ParseError::UnknownIdentifier(id.to_owned()))),
    };
    Ok(Some(Checker { variant, salt, checksum }))
}

impl Checker<'_> {
    fn verify(&self, pass: &str) -> Result<Verdict> {
	let stored = STANDARD.decode(self.checksum)
	    .map_err(|source| Error::parse(ALGORITHM, ParseError::Base64 { field: "checksum", source }))?;
	let calc = self.variant.digest(self.salt.as_bytes(), pass.as_bytes());
	Ok(consteq(&calc, &stored).into())
    }
}

/// Verify a password against a salted MD5 hash.
///
/// A checksum which isn't valid Base64 is reported as a parse error.
pub fn verify(hash: &str, pass: &str) -> Result<Verdict> {
    match parse_md5salted_hash(hash)? {
	Some(c) => c.verify(pass),
	None => Ok(Verdict::Skip),
    }
}

/// Generates salted MD5 hashes. Meant for tests and migrations only.
#[derive(Clone)]
pub struct Hasher {
    variant: Variant,
    source: Arc<dyn SaltSource>,
}

impl Hasher {
    /// Hasher for the given salt placement.
    pub fn new(variant: Variant) -> Hasher {
	Hasher { variant, source: salt::default_source() }
    }

    /// Draw salt from a custom source.
    pub fn with_source(mut self, source: Arc<dyn SaltSource>) -> Hasher {
	self.source = source;
	self
    }
}

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let c = match parse_md5salted_hash(encoded)? {
	    Some(c) => c,
	    None => return Ok(Verdict::Skip),
	};
	match c.verify(password)? {
	    Verdict::Ok if c.variant != self.variant => Ok(Verdict::NeedUpdate),
	    v => Ok(v),
	}
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	let raw = salt::new_salt(&*self.source, SALT_BYTES, ALGORITHM)?;
	let salt = STANDARD.encode(raw);
	let checksum = self.variant.digest(salt.as_bytes(), password.as_bytes());
	Ok(format!("${}${}${}", self.variant.ident(), salt, STANDARD.encode(checksum)))
    }
}

#[cfg(test)]
mod tests {
    use super::{verify, Hasher, Variant};
    use crate::error::{Error, ParseError};
    use crate::salt::{FailingSource, FixedSalt};
    use crate::verifier::{Hasher as _, Verifier as _};
    use crate::Verdict;
    use rstest::rstest;
    use std::sync::Arc;

    const SUFFIXED: &str = "$md5salted-suffix$c2FsdA==$R58+SD/95ORa9VZ9BPS5FA==";
    const PREFIXED: &str = "$md5salted-prefix$c2FsdA==$0M2MYNUmNumHqqQ+kmuTUQ==";

    #[rstest]
    #[case(SUFFIXED, "Test1000!", Verdict::Ok)]
    #[case(PREFIXED, "Test1000!", Verdict::Ok)]
    #[case(SUFFIXED, "Test1000?", Verdict::Fail)]
    #[case(PREFIXED, "test1000!", Verdict::Fail)]
    #[case("$1$kJ4QkJaQ$3EbD/pJddrq5HW3mpZ4KZ1", "password", Verdict::Skip)]
    fn verification(#[case] hash: &str, #[case] pass: &str, #[case] want: Verdict) {
	assert_eq!(verify(hash, pass).unwrap(), want);
    }

    #[test]
    fn malformed() {
	assert!(matches!(verify("$md5salted$foo", "x"),
	    Err(Error::Parse { reason: ParseError::MissingField(_), .. })));
	assert!(matches!(verify("$md5salted-unknown$foo$foo", "x"),
	    Err(Error::Parse { reason: ParseError::UnknownIdentifier(_), .. })));
	let err = verify("$md5salted-suffix$c2FsdA==$R58+SD/95ORa9VZ9BPS5F!==", "Test1000!").unwrap_err();
	assert!(matches!(err, Error::Parse { reason: ParseError::Base64 { .. }, .. }));
	assert_eq!(err.verdict(), Verdict::Skip);
    }

    #[test]
    fn hasher() {
	let h = Hasher::new(Variant::Prefix).with_source(Arc::new(FixedSalt(b"saltsaltsalt".to_vec())));
	let hash = h.hash("Test1000!").unwrap();
	assert!(hash.starts_with("$md5salted-prefix$c2FsdHNhbHRzYWx0$"));
	assert_eq!(h.verify(&hash, "Test1000!").unwrap(), Verdict::Ok);
	assert_eq!(h.verify(SUFFIXED, "Test1000!").unwrap(), Verdict::NeedUpdate);
	assert_eq!(h.verify(PREFIXED, "Test1000!").unwrap(), Verdict::Ok);
    }

    #[test]
    fn salt_failure() {
	let h = Hasher::new(Variant::Suffix).with_source(Arc::new(FailingSource));
	assert!(matches!(h.hash("Test1000!"), Err(Error::Random { algorithm: "md5salted", .. })));
    }
}
