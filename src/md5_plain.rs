//! Unsalted hexadecimal MD5 digest.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! A bare MD5 digest of the password, written as 32 hexadecimal digits.
//! Found in databases of applications which predate any notion of
//! password hashing. The format has no identifying prefix: every
//! hexadecimal string is taken to be a digest, and checked, even if it
//! has the wrong length. This verifier should be the last one in a
//! [`Swapper`](crate::Swapper).
//!
//! # Example
//!
//! ```
//! use pwswap::{md5_plain, Verdict};
//!
//! assert_eq!(md5_plain::verify("5f4dcc3b5aa765d61d8327deb882cf99", "password").unwrap(),
//!     Verdict::Ok);
//! ```

use md5::{Digest, Md5};

use crate::error::Error;
use crate::verifier::{self, Verdict};
use crate::{consteq, Result};

const ALGORITHM: &str = "md5plain";

/// Verify a password against a hexadecimal MD5 digest.
///
/// Strings which aren't hexadecimal yield a parse error. Hexadecimal
/// strings of the wrong length, including the empty string, never match.
pub fn verify(digest: &str, pass: &str) -> Result<Verdict> {
    let decoded = hex::decode(digest).map_err(|e| Error::parse(ALGORITHM, e.into()))?;
    let sum = Md5::digest(pass.as_bytes());
    Ok(consteq(&sum, &decoded).into())
}

/// Produces lowercase hexadecimal MD5 digests.
///
/// Meant for tests and migrations only.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hasher;

impl verifier::Verifier for Hasher {
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	verify(encoded, password)
    }
}

impl verifier::Hasher for Hasher {
    fn hash(&self, password: &str) -> Result<String> {
	Ok(hex::encode(Md5::digest(password.as_bytes())))
    }
}
