//! Dispatch over several verifiers, with transparent hash upgrades.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! A [`Swapper`] owns one [`Hasher`], which produces all new hashes, and an
//! ordered list of fallback [`Verifier`]s for formats which are still
//! accepted, but no longer generated. The hasher is always consulted first.
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Error, SkipErrors};
use crate::verifier::{Hasher, Verdict, Verifier};
use crate::Result;

/// Verifies passwords against hashes in any of the configured formats, and
/// produces updated hashes when needed.
///
/// A `Swapper` holds no mutable state, and can be shared between threads.
#[derive(Clone)]
pub struct Swapper {
    hasher: Arc<dyn Hasher>,
    fallbacks: Vec<Arc<dyn Verifier>>,
}

impl Swapper {
    /// Create a swapper which hashes with `hasher`, and verifies only its
    /// format until fallbacks are added.
    pub fn new<H: Hasher + 'static>(hasher: H) -> Swapper {
	Swapper::with_shared(Arc::new(hasher))
    }

    /// Create a swapper around a hasher chosen at run time.
    pub fn with_shared(hasher: Arc<dyn Hasher>) -> Swapper {
	Swapper { hasher, fallbacks: Vec::new() }
    }

    /// Append a fallback verifier. Fallbacks are tried in the order in which
    /// they were added.
    pub fn fallback<V: Verifier + 'static>(mut self, verifier: V) -> Swapper {
	self.fallbacks.push(Arc::new(verifier));
	self
    }

    /// Number of verifiers, including the hasher.
    pub fn len(&self) -> usize {
	self.fallbacks.len() + 1
    }

    /// Always `false`; the hasher is a verifier too.
    pub fn is_empty(&self) -> bool {
	false
    }

    /// Verify the password against the encoded hash.
    ///
    /// Returns `Ok(None)` when the password matches and the hash is already
    /// in the hasher's format with the hasher's parameters. Returns
    /// `Ok(Some(updated))` when the password matches, but the hash should be
    /// replaced by `updated`.
    ///
    /// # Errors
    ///
    /// `Error::PasswordMismatch` if a verifier rejected the password without
    /// giving a reason, or the verifier's own error if it did.
    /// `Error::NoVerifier` if no verifier recognized the format. A single
    /// parse error is returned as is; several are collected in
    /// `Error::Skipped`.
    pub fn verify(&self, encoded: &str, password: &str) -> Result<Option<String>> {
	self.verify_and_update_inner(encoded, password, password)
    }

    /// Verify `old_password` against the encoded hash, and on success return
    /// a hash of `new_password`.
    ///
    /// The result is `Ok(None)` only if the encoded hash would not need
    /// updating and the passwords are equal, which is rejected up front.
    ///
    /// # Errors
    ///
    /// `Error::PasswordNoChange` if both passwords are equal, otherwise as
    /// for [`verify`](Swapper::verify).
    pub fn verify_and_update(&self, encoded: &str, old_password: &str, new_password: &str) -> Result<Option<String>> {
	if old_password == new_password {
	    return Err(Error::PasswordNoChange);
	}
	self.verify_and_update_inner(encoded, old_password, new_password)
    }

    /// Hash the password with the hasher.
    pub fn hash(&self, password: &str) -> Result<String> {
	self.hasher.hash(password)
    }

    fn verify_at(&self, index: usize, encoded: &str, password: &str) -> Result<Verdict> {
	match index {
	    0 => self.hasher.verify(encoded, password),
	    i => self.fallbacks[i - 1].verify(encoded, password),
	}
    }

    fn verify_and_update_inner(&self, encoded: &str, old_password: &str, new_password: &str) -> Result<Option<String>> {
	let mut skipped = Vec::new();
	for index in 0..self.len() {
	    let (verdict, err) = match self.verify_at(index, encoded, old_password) {
		Ok(verdict) => (verdict, None),
		Err(Error::InvalidVerdict { code, .. }) => {
		    warn!("verifier {} returned invalid result {}", index, code);
		    return Err(Error::InvalidVerdict { index, code });
		},
		Err(e) => (e.verdict(), Some(e)),
	    };
	    match verdict {
		Verdict::Fail => {
		    debug!("verifier {} rejected the password", index);
		    return Err(err.unwrap_or(Error::PasswordMismatch));
		},
		Verdict::Ok if index == 0 && old_password == new_password => {
		    return Ok(None);
		},
		Verdict::Ok | Verdict::NeedUpdate => {
		    debug!("verifier {} matched with {}, rehashing", index, verdict);
		    return self.hasher.hash(new_password).map(Some);
		},
		Verdict::Skip => {
		    if let Some(e) = err {
			debug!("verifier {} skipped: {}", index, e);
			skipped.push(e);
		    }
		},
	    }
	}
	if skipped.len() > 1 {
	    return Err(SkipErrors(skipped).into());
	}
	Err(skipped.pop().unwrap_or(Error::NoVerifier))
    }
}

#[cfg(test)]
mod tests {
    use super::Swapper;
    use crate::error::{Error, ParseError};
    use crate::verifier::{RawVerifier, Verdict};
    use crate::{argon2, scrypt};
    use rstest::rstest;

    const PASSWORD: &str = "password";
    const ARGON2I: &str = "$argon2i$v=19$m=4096,t=3,p=1$cmFuZG9tc2FsdGlzaGFyZA$YMvo8AUoNtnKYGqeODruCjHdiEbl1pKL2MsYy9VgU/E";
    const ARGON2ID: &str = "$argon2id$v=19$m=4096,t=3,p=1$cmFuZG9tc2FsdGlzaGFyZA$DYojYpnUWSMmTtrkVXyaNWVGxLmGe1n8VJBPDdFkbjU";
    const SCRYPT: &str = "$scrypt$ln=16,r=8,p=1$cmFuZG9tc2FsdGlzaGFyZA$Rh+NnJNo1I6nRwaNqbDm6kmADswD1+7FTKZ7Ln9D8nQ";

    fn mock(encoded: &str, _: &str) -> (i32, Option<Error>) {
	match encoded {
	    "$mock$bug" => (99, None),
	    "$mock$failErr" => (Verdict::Fail as i32, Some(Error::InvalidParams { algorithm: "mock", reason: "oops!".into() })),
	    "$argon2id$multi" => (Verdict::Skip as i32, Some(Error::parse("mock", ParseError::MissingField("oops!")))),
	    _ => (Verdict::Skip as i32, None),
	}
    }

    fn swapper() -> Swapper {
	let params = argon2::Params { time: 3, memory: 4096, threads: 1, ..argon2::Params::RECOMMENDED_ID };
	Swapper::new(argon2::Hasher::id(params))
	    .fallback(RawVerifier(mock))
	    .fallback(scrypt::verify)
    }

    #[test]
    fn verifier_count() {
	assert_eq!(swapper().len(), 3);
	assert_eq!(Swapper::new(argon2::Hasher::id(argon2::Params::RECOMMENDED_ID)).len(), 1);
    }

    #[rstest]
    #[case::ok(ARGON2ID, PASSWORD, PASSWORD, false)]
    #[case::password_update(ARGON2ID, PASSWORD, "newpassword", true)]
    #[case::argon2_update(ARGON2I, PASSWORD, PASSWORD, true)]
    #[case::hasher_upgrade(SCRYPT, PASSWORD, PASSWORD, true)]
    fn updates(#[case] encoded: &str, #[case] old: &str, #[case] new: &str, #[case] want_updated: bool) {
	let updated = swapper().verify_and_update_inner(encoded, old, new).unwrap();
	assert_eq!(updated.is_some(), want_updated);
	if let Some(updated) = updated {
	    assert!(updated.starts_with("$argon2id$v=19$m=4096,t=3,p=1$"));
	    assert_eq!(argon2::verify(&updated, new).unwrap(), Verdict::Ok);
	}
    }

    #[test]
    fn no_verifier() {
	assert!(matches!(swapper().verify("foobar", PASSWORD), Err(Error::NoVerifier)));
    }

    #[test]
    fn single_parse_error() {
	match swapper().verify("$argon2id$foo", PASSWORD) {
	    Err(Error::Parse { algorithm: "argon2", .. }) => (),
	    other => panic!("unexpected {:?}", other),
	}
    }

    #[test]
    fn multiple_parse_errors() {
	match swapper().verify("$argon2id$multi", PASSWORD) {
	    Err(Error::Skipped(errs)) => {
		assert_eq!(errs.0.len(), 2);
		assert!(errs.to_string().starts_with("passwap multiple parse errors: argon2 parse: "));
	    },
	    other => panic!("unexpected {:?}", other),
	}
    }

    #[test]
    fn wrong_password() {
	assert!(matches!(swapper().verify(ARGON2I, "foobar"), Err(Error::PasswordMismatch)));
    }

    #[test]
    fn fail_with_error() {
	assert!(matches!(swapper().verify("$mock$failErr", PASSWORD), Err(Error::InvalidParams { algorithm: "mock", .. })));
    }

    #[test]
    fn skip_with_error_continues() {
	let s = Swapper::new(argon2::Hasher::id(argon2::Params { time: 3, memory: 4096, threads: 1, ..argon2::Params::RECOMMENDED_ID }))
	    .fallback(RawVerifier(|_: &str, _: &str| {
		(Verdict::Skip as i32, Some(Error::InvalidParams { algorithm: "legacy", reason: "unknown salt".into() }))
	    }))
	    .fallback(scrypt::verify);
	assert!(s.verify(SCRYPT, PASSWORD).unwrap().is_some());
	match s.verify("foobar", PASSWORD) {
	    Err(Error::Classified { verdict: Verdict::Skip, source }) => {
		assert!(matches!(*source, Error::InvalidParams { algorithm: "legacy", .. }));
	    },
	    other => panic!("unexpected {:?}", other),
	}
    }

    #[test]
    fn fallback_fail_stops_dispatch() {
	let s = Swapper::new(argon2::Hasher::id(argon2::Params { time: 3, memory: 4096, threads: 1, ..argon2::Params::RECOMMENDED_ID }))
	    .fallback(RawVerifier(|_: &str, _: &str| (Verdict::Fail as i32, None::<Error>)))
	    .fallback(scrypt::verify);
	assert!(matches!(s.verify(SCRYPT, PASSWORD), Err(Error::PasswordMismatch)));
    }

    #[test]
    fn verifier_bug() {
	let err = swapper().verify("$mock$bug", PASSWORD).unwrap_err();
	assert!(matches!(err, Error::InvalidVerdict { index: 1, code: 99 }));
	assert_eq!(err.to_string(), "(BUG) verifier 1 returned invalid result N 99");
    }

    #[test]
    fn no_change() {
	assert!(matches!(swapper().verify_and_update(ARGON2ID, PASSWORD, PASSWORD), Err(Error::PasswordNoChange)));
	assert!(swapper().verify_and_update(ARGON2ID, PASSWORD, "newpassword").unwrap().is_some());
    }

    #[test]
    fn update_then_settle() {
	let s = swapper();
	let updated = s.verify(ARGON2I, PASSWORD).unwrap().unwrap();
	assert_eq!(s.verify(&updated, PASSWORD).unwrap(), None);
    }

    #[test]
    fn hash_delegates() {
	let s = swapper();
	let hash = s.hash(PASSWORD).unwrap();
	assert!(hash.starts_with("$argon2id$v=19$m=4096,t=3,p=1$"));
	assert_eq!(s.verify(&hash, PASSWORD).unwrap(), None);
    }
}
