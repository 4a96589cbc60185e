//! Verification results and the capabilities shared by all schemes.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! A scheme module exposes a `Verifier`, which checks passwords against any
//! hash string in its format, and a `Hasher`, which generates new hash
//! strings with fixed parameters and also verifies them. Both implement the
//! [`Verifier`] trait; the `Hasher` additionally implements [`Hasher`].
//!
//! The outcome of a verification is a [`Verdict`]. An error returned by
//! [`Verifier::verify`] implies the verdict given by
//! [`Error::verdict`](crate::error::Error::verdict).
use std::convert::TryFrom;
use std::fmt;

use crate::error::{BoundsError, Error};
use crate::Result;

/// Outcome of a password verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The password doesn't match.
    Fail = 0,
    /// The password matches, no further action is required.
    Ok = 1,
    /// The password matches, but the hash was produced with different
    /// parameters and should be replaced.
    NeedUpdate = 2,
    /// The hash string isn't in a format handled by the verifier.
    Skip = 3,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
	f.write_str(match self {
	    Verdict::Fail => "Fail",
	    Verdict::Ok => "OK",
	    Verdict::NeedUpdate => "NeedUpdate",
	    Verdict::Skip => "Skip",
	})
    }
}

impl TryFrom<i32> for Verdict {
    type Error = i32;

    /// Converts a raw result code, returning the code back if it's unknown.
    fn try_from(code: i32) -> std::result::Result<Verdict, i32> {
	match code {
	    0 => Ok(Verdict::Fail),
	    1 => Ok(Verdict::Ok),
	    2 => Ok(Verdict::NeedUpdate),
	    3 => Ok(Verdict::Skip),
	    _ => Err(code),
	}
    }
}

impl From<bool> for Verdict {
    fn from(matched: bool) -> Verdict {
	if matched { Verdict::Ok } else { Verdict::Fail }
    }
}

/// Checks passwords against encoded hash strings of one scheme.
///
/// An implementation returns `Ok(Verdict::Skip)` when the string doesn't
/// carry the scheme's signature, and a parse error when the signature is
/// recognized but the rest of the string is malformed.
pub trait Verifier: Send + Sync {
    /// Verify the password against the encoded hash.
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict>;
}

/// Produces new encoded hashes, and verifies its own.
pub trait Hasher: Verifier {
    /// Hash the password with a fresh salt.
    fn hash(&self, password: &str) -> Result<String>;
}

/// Checks the parameters of an encoded hash against configured bounds.
pub trait Validator {
    /// Returns `Verdict::Ok` if all parameters are within bounds, a bounds
    /// error if one isn't, and `Verdict::Skip` for foreign hash strings.
    fn validate(&self, encoded: &str) -> Result<Verdict>;
}

impl<F> Verifier for F
    where F: Fn(&str, &str) -> Result<Verdict> + Send + Sync
{
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	self(encoded, password)
    }
}

/// Verifier backed by a function returning raw result codes.
///
/// Codes follow the numbering of [`Verdict`]. Any other code is a defect in
/// the function and is reported as `Error::InvalidVerdict`. An error returned
/// with a code other than the one its class implies is wrapped in
/// `Error::Classified`, so that the dispatcher still acts on the code.
pub struct RawVerifier<F>(pub F);

impl<F> Verifier for RawVerifier<F>
    where F: Fn(&str, &str) -> (i32, Option<Error>) + Send + Sync
{
    fn verify(&self, encoded: &str, password: &str) -> Result<Verdict> {
	let (code, err) = (self.0)(encoded, password);
	match (Verdict::try_from(code), err) {
	    (Err(code), _) => Err(Error::InvalidVerdict { index: 0, code }),
	    (Ok(v), Some(e)) if e.verdict() == v => Err(e),
	    (Ok(v), Some(e)) => Err(Error::Classified { verdict: v, source: Box::new(e) }),
	    (Ok(v), None) => Ok(v),
	}
    }
}

/// Check that `actual` is within `[min, max]`.
pub(crate) fn check_bounds<T>(algorithm: &'static str, param: &'static str, min: T, max: T, actual: T) -> Result<()>
    where T: Into<u64> + PartialOrd + Copy
{
    if actual < min || actual > max {
	return Err(BoundsError { algorithm, param, min: min.into(), max: max.into(), actual: actual.into() }.into());
    }
    Ok(())
}

/// Turn the outcome of a parse-and-validate pass into a verdict.
pub(crate) fn validation_verdict<C>(parsed: Result<Option<C>>, check: impl FnOnce(&C) -> Result<()>) -> Result<Verdict> {
    match parsed? {
	None => Ok(Verdict::Skip),
	Some(c) => check(&c).map(|_| Verdict::Ok),
    }
}
