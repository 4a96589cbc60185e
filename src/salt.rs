//! Sources of salt.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.
//!
//! Hashers draw fresh salt for every hash through the [`SaltSource`] trait.
//! The default source is the operating system's random number generator;
//! any other `RngCore` can be used by wrapping it in a `Mutex`, and a fixed
//! byte string can be supplied for reproducible output.
use std::io;
use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::Error;
use crate::Result;

/// Recommended salt length in bytes.
pub const RECOMMENDED_LEN: usize = 16;

/// A source of random bytes for salt generation.
pub trait SaltSource: Send + Sync {
    /// Fill the whole buffer, or fail.
    fn read_salt(&self, buf: &mut [u8]) -> io::Result<()>;
}

/// The operating system's random number generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl SaltSource for OsRandom {
    fn read_salt(&self, buf: &mut [u8]) -> io::Result<()> {
	OsRng.try_fill_bytes(buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<R: RngCore + Send> SaltSource for Mutex<R> {
    fn read_salt(&self, buf: &mut [u8]) -> io::Result<()> {
	let mut rng = self.lock().map_err(|_| io::Error::new(io::ErrorKind::Other, "poisoned rng lock"))?;
	rng.try_fill_bytes(buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<S: SaltSource + ?Sized> SaltSource for Arc<S> {
    fn read_salt(&self, buf: &mut [u8]) -> io::Result<()> {
	(**self).read_salt(buf)
    }
}

/// Replays the same bytes for every request.
///
/// Requests longer than the stored bytes fail with `UnexpectedEof`.
#[derive(Debug, Clone)]
pub struct FixedSalt(pub Vec<u8>);

impl SaltSource for FixedSalt {
    fn read_salt(&self, buf: &mut [u8]) -> io::Result<()> {
	if buf.len() > self.0.len() {
	    return Err(io::ErrorKind::UnexpectedEof.into());
	}
	buf.copy_from_slice(&self.0[..buf.len()]);
	Ok(())
    }
}

/// A source which always fails. Useful for exercising error paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSource;

impl SaltSource for FailingSource {
    fn read_salt(&self, _buf: &mut [u8]) -> io::Result<()> {
	Err(io::ErrorKind::BrokenPipe.into())
    }
}

/// Read `size` bytes of salt, attributing failure to `algorithm`.
pub(crate) fn new_salt(src: &dyn SaltSource, size: usize, algorithm: &'static str) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; size];
    src.read_salt(&mut salt).map_err(|e| {
	log::warn!("{}: salt source failed: {}", algorithm, e);
	Error::random(algorithm, e)
    })?;
    Ok(salt)
}

pub(crate) fn default_source() -> Arc<dyn SaltSource> {
    Arc::new(OsRandom)
}

#[cfg(test)]
mod tests {
    use super::{new_salt, FailingSource, FixedSalt, OsRandom};
    use crate::error::Error;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    #[test]
    fn fixed() {
	let src = FixedSalt(b"pepper".to_vec());
	assert_eq!(new_salt(&src, 6, "md5").unwrap(), b"pepper");
	assert_eq!(new_salt(&src, 3, "md5").unwrap(), b"pep");
	assert!(new_salt(&src, 16, "md5").is_err());
    }

    #[test]
    fn failing() {
	match new_salt(&FailingSource, 16, "scrypt") {
	    Err(e @ Error::Random { .. }) => assert_eq!(e.to_string(), "scrypt: salt: broken pipe"),
	    other => panic!("unexpected {:?}", other),
	}
    }

    #[test]
    fn seeded() {
	let a = Mutex::new(StdRng::seed_from_u64(7));
	let b = Mutex::new(StdRng::seed_from_u64(7));
	assert_eq!(new_salt(&a, 16, "x").unwrap(), new_salt(&b, 16, "x").unwrap());
	assert_eq!(new_salt(&OsRandom, 16, "x").unwrap().len(), 16);
    }
}
