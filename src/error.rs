//! Error values.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Every error carries a [`Verdict`](crate::Verdict) class, available
//! through [`Error::verdict`]. A verifier which fails to make sense of an
//! encoded string it otherwise recognizes reports a parse error, which is
//! classified as `Skip`: the dispatcher may try other verifiers. Errors
//! which occur after a hash was recognized and decoded are classified as
//! `Fail`, and stop the dispatcher.
use std::io;
use std::num::ParseIntError;
use thiserror::Error;

use crate::verifier::Verdict;

/// Possible errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The hash string has a recognized prefix, but is malformed.
    #[error("{algorithm} parse: {reason}")]
    Parse {
	/// Name of the algorithm whose parser rejected the string.
	algorithm: &'static str,
	/// What was wrong.
	reason: ParseError,
    },
    /// A decoded parameter is outside of the configured bounds.
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    /// The hash string uses a recognized, but deliberately unsupported, variant.
    #[error("{algorithm}: variant {variant} is not supported")]
    Unsupported {
	/// Name of the algorithm.
	algorithm: &'static str,
	/// The offending variant identifier.
	variant: String,
    },
    /// The underlying primitive rejected the hashing parameters.
    #[error("{algorithm}: invalid parameters: {reason}")]
    InvalidParams {
	/// Name of the algorithm.
	algorithm: &'static str,
	/// Description provided by the primitive.
	reason: String,
    },
    /// Salt could not be read from the random source.
    #[error("{algorithm}: salt: {source}")]
    Random {
	/// Name of the algorithm which requested the salt.
	algorithm: &'static str,
	/// The I/O error reported by the source.
	#[source]
	source: io::Error,
    },
    /// Bcrypt specific failure.
    #[error(transparent)]
    Bcrypt(#[from] BcryptError),
    /// The password does not match the hash.
    #[error("passwap: password does not match hash")]
    PasswordMismatch,
    /// The old and new password given for an update are equal.
    #[error("passwap: new password same as old password")]
    PasswordNoChange,
    /// None of the configured verifiers recognized the hash string.
    #[error("passwap: no verifier found for encoded string")]
    NoVerifier,
    /// Several verifiers recognized the hash string, but couldn't parse it.
    #[error(transparent)]
    Skipped(#[from] SkipErrors),
    /// An error reported by a verifier together with a result other than the
    /// one the error implies on its own.
    #[error("{source}")]
    Classified {
	/// The result reported by the verifier.
	verdict: Verdict,
	/// The reported error.
	source: Box<Error>,
    },
    /// A verification result code outside of the defined set.
    #[error("(BUG) verifier {index} returned invalid result N {code}")]
    InvalidVerdict {
	/// Position of the verifier in the dispatch list.
	index: usize,
	/// The raw result code.
	code: i32,
    },
}

impl Error {
    pub(crate) fn parse(algorithm: &'static str, reason: ParseError) -> Error {
	Error::Parse { algorithm, reason }
    }

    pub(crate) fn random(algorithm: &'static str, source: io::Error) -> Error {
	Error::Random { algorithm, source }
    }

    /// The verification result which accompanies this error.
    pub fn verdict(&self) -> Verdict {
	match self {
	    Error::Parse { .. } => Verdict::Skip,
	    Error::Bcrypt(e) if e.is_foreign() => Verdict::Skip,
	    Error::Classified { verdict, .. } => *verdict,
	    _ => Verdict::Fail,
	}
    }
}

/// Reasons for rejecting a hash string during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The string has the wrong total length.
    #[error("invalid length {actual}, expected {expected}")]
    Length {
	/// Required length.
	expected: usize,
	/// Length of the input.
	actual: usize,
    },
    /// A `$`-delimited field is missing.
    #[error("missing {0} field")]
    MissingField(&'static str),
    /// There is data after the last expected field.
    #[error("unexpected trailing data")]
    TrailingData,
    /// A field contains a character outside of its alphabet.
    #[error("invalid character in {0}")]
    Encoding(&'static str),
    /// A field has an invalid length.
    #[error("invalid {field} length {actual}")]
    FieldLength {
	/// Name of the field.
	field: &'static str,
	/// Length of the field in the input.
	actual: usize,
    },
    /// A numeric field could not be parsed.
    #[error("invalid {field}: {source}")]
    Number {
	/// Name of the field.
	field: &'static str,
	/// Integer parsing error.
	#[source]
	source: ParseIntError,
    },
    /// A `key=value` parameter has an unexpected key.
    #[error("expected parameter {0}")]
    Key(&'static str),
    /// The scheme identifier is not known to the parser.
    #[error("unknown identifier {0}")]
    UnknownIdentifier(String),
    /// The scheme version is not supported.
    #[error("unsupported version {0}")]
    Version(u32),
    /// A Base64 field could not be decoded.
    #[error("{field}: {source}")]
    Base64 {
	/// Name of the field.
	field: &'static str,
	/// Decoder error.
	#[source]
	source: base64::DecodeError,
    },
    /// A hexadecimal digest could not be decoded.
    #[error("{0}")]
    Hex(#[from] hex::FromHexError),
    /// Bcrypt cost extraction failed.
    #[error("{0}")]
    Bcrypt(#[from] BcryptError),
}

/// A parameter violates the configured bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{algorithm}: {param} out of bounds; min: {min}, max: {max}, actual: {actual}")]
pub struct BoundsError {
    /// Name of the algorithm.
    pub algorithm: &'static str,
    /// Name of the offending parameter.
    pub param: &'static str,
    /// Configured lower bound.
    pub min: u64,
    /// Configured upper bound.
    pub max: u64,
    /// Value decoded from the hash string.
    pub actual: u64,
}

/// Failures reported by the bcrypt engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BcryptError {
    /// The hash string is shorter than any valid bcrypt hash.
    #[error("crypto/bcrypt: hashedSecret too short to be a bcrypted password")]
    HashTooShort,
    /// The hash string doesn't start with `$`.
    #[error("crypto/bcrypt: bcrypt hashes must start with '$', but hashedSecret started with '{0}'")]
    InvalidPrefix(char),
    /// The major version is newer than supported.
    #[error("crypto/bcrypt: bcrypt algorithm version '{0}' requested is newer than current version '2'")]
    VersionTooNew(char),
    /// The cost field is malformed or out of range.
    #[error("crypto/bcrypt: cost {0} is outside allowed range (4,31)")]
    InvalidCost(String),
    /// The salt or checksum contains a character outside of the alphabet.
    #[error("crypto/bcrypt: invalid character in salt or checksum")]
    Encoding,
    /// Passwords longer than 72 bytes can't be hashed without truncation.
    #[error("bcrypt: password length exceeds 72 bytes")]
    PasswordTooLong,
}

impl BcryptError {
    /// Errors which indicate the string is not a bcrypt hash at all.
    fn is_foreign(&self) -> bool {
	matches!(self, BcryptError::InvalidPrefix(_) | BcryptError::VersionTooNew(_))
    }
}

/// Aggregate of parse errors from several verifiers.
///
/// Returned only when more than one verifier recognized the hash string,
/// but failed to parse it.
#[derive(Debug, Error)]
pub struct SkipErrors(pub Vec<Error>);

impl std::fmt::Display for SkipErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
	let msgs = self.0.iter().map(|e| e.to_string()).collect::<Vec<_>>();
	write!(f, "passwap multiple parse errors: {}", msgs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::{BcryptError, BoundsError, Error, ParseError, SkipErrors};
    use crate::Verdict;

    #[test]
    fn verdict_classes() {
	assert_eq!(Error::parse("md5", ParseError::TrailingData).verdict(), Verdict::Skip);
	assert_eq!(Error::Bcrypt(BcryptError::VersionTooNew('3')).verdict(), Verdict::Skip);
	assert_eq!(Error::Bcrypt(BcryptError::HashTooShort).verdict(), Verdict::Fail);
	assert_eq!(Error::Unsupported { algorithm: "argon2", variant: "argon2d".into() }.verdict(), Verdict::Fail);
	assert_eq!(Error::PasswordMismatch.verdict(), Verdict::Fail);
	let e = Error::Classified { verdict: Verdict::Skip, source: Box::new(Error::PasswordMismatch) };
	assert_eq!(e.verdict(), Verdict::Skip);
	assert_eq!(e.to_string(), "passwap: password does not match hash");
    }

    #[test]
    fn bounds_message() {
	let e = BoundsError { algorithm: "bcrypt", param: "cost", min: 4, max: 31, actual: 3 };
	assert_eq!(e.to_string(), "bcrypt: cost out of bounds; min: 4, max: 31, actual: 3");
    }

    #[test]
    fn joined_skip_errors() {
	let e = SkipErrors(vec![
	    Error::parse("a", ParseError::MissingField("salt")),
	    Error::parse("b", ParseError::TrailingData),
	]);
	assert_eq!(e.to_string(),
	    "passwap multiple parse errors: a parse: missing salt field; b parse: unexpected trailing data");
    }
}
