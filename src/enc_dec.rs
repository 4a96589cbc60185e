// Encoding and decoding routines.
//
// Copyright (c) 2016 Ivan Nejgebauer <inejge@gmail.com>
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>. This file may not be copied,
// modified, or distributed except according to the terms of this
// license.

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD, STANDARD_NO_PAD};
use base64::Engine;

const CRYPT_HASH64: &[u8] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const CRYPT_HASH64_ENC_MAP: &[u8] = b"\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x00\x01\
				      \x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x40\x40\x40\x40\x40\x40\
				      \x40\x0c\x0d\x0e\x0f\x10\x11\x12\x13\x14\x15\x16\x17\x18\x19\x1a\
				      \x1b\x1c\x1d\x1e\x1f\x20\x21\x22\x23\x24\x25\x40\x40\x40\x40\x40\
				      \x40\x26\x27\x28\x29\x2a\x2b\x2c\x2d\x2e\x2f\x30\x31\x32\x33\x34\
				      \x35\x36\x37\x38\x39\x3a\x3b\x3c\x3d\x3e\x3f\x40\x40\x40\x40\x40";

const BCRYPT_HASH64: &[u8] = b"./ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const BCRYPT_HASH64_ENC_MAP: &[u8] = b"\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x40\x00\x01\
				       \x36\x37\x38\x39\x3a\x3b\x3c\x3d\x3e\x3f\x40\x40\x40\x40\x40\x40\
				       \x40\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f\x10\
				       \x11\x12\x13\x14\x15\x16\x17\x18\x19\x1a\x1b\x40\x40\x40\x40\x40\
				       \x40\x1c\x1d\x1e\x1f\x20\x21\x22\x23\x24\x25\x26\x27\x28\x29\x2a\
				       \x2b\x2c\x2d\x2e\x2f\x30\x31\x32\x33\x34\x35\x40\x40\x40\x40\x40";

// Look up a character in one of the decoding maps.
fn map_char(map: &[u8], c: u8) -> Option<u8> {
    let idx = c.checked_sub(0x20)? as usize;
    match map.get(idx) {
	Some(&dec) if dec < 64 => Some(dec),
	_ => None,
    }
}

/// Decode a bcrypt Base64 string into `decbuf`, stopping when it's full.
pub fn bcrypt_hash64_decode(enc: &str, decbuf: &mut [u8]) -> Option<()> {
    let mut cbuild = 0u8;
    let mut cpos = 0;
    let mut dec_idx = 0;
    for b in enc.bytes() {
	let dec = map_char(BCRYPT_HASH64_ENC_MAP, b)?;
	if cpos == 0 {
	    cbuild = dec;
	} else {
	    cbuild <<= cpos;
	    cbuild |= dec >> (6 - cpos);
	    decbuf[dec_idx] = cbuild;
	    dec_idx += 1;
	    if dec_idx == decbuf.len() {
		break;
	    }
	    cbuild = dec & (0x3F >> cpos);
	}
	cpos += 2;
	if cpos > 6 {
	    cpos = 0;
	}
    }
    Some(())
}

pub fn bcrypt_hash64_encode(bs: &[u8]) -> String {
    let ngroups = (bs.len() + 2) / 3;
    let mut out = String::with_capacity(ngroups * 4);
    for g in 0..ngroups {
	let mut g_idx = g * 3;
	let mut enc = 0u32;
	for _ in 0..3 {
	    let b = (if g_idx < bs.len() { bs[g_idx] } else { 0 }) as u32;
	    enc <<= 8;
	    enc |= b;
	    g_idx += 1;
	}
	for _ in 0..4 {
	    out.push(BCRYPT_HASH64[((enc >> 18) & 0x3F) as usize] as char);
	    enc <<= 6;
	}
    }
    match bs.len() % 3 {
	1 => { out.pop(); out.pop(); },
	2 => { out.pop(); },
	_ => (),
    }
    out
}

/// Encode bytes with the crypt(3) alphabet, least significant bits first.
///
/// Every three input bytes produce four characters; a trailing group of one
/// or two bytes produces two or three characters.
pub fn crypt3_encode(bs: &[u8]) -> String {
    let ngroups = (bs.len() + 2) / 3;
    let mut out = String::with_capacity(ngroups * 4);
    for g in 0..ngroups {
	let mut g_idx = g * 3;
	let mut enc = 0u32;
	for _ in 0..3 {
	    let b = (if g_idx < bs.len() { bs[g_idx] } else { 0 }) as u32;
	    enc >>= 8;
	    enc |= b << 16;
	    g_idx += 1;
	}
	for _ in 0..4 {
	    out.push(CRYPT_HASH64[(enc & 0x3F) as usize] as char);
	    enc >>= 6;
	}
    }
    match bs.len() % 3 {
	1 => { out.pop(); out.pop(); },
	2 => { out.pop(); },
	_ => (),
    }
    out
}

/// Inverse of `crypt3_encode`. Leftover bits which don't form a whole byte
/// are dropped. Returns `None` on a character outside of the alphabet.
pub fn crypt3_decode(enc: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(enc.len() * 3 / 4);
    let mut acc = 0u32;
    let mut bits = 0;
    for b in enc.bytes() {
	acc |= (map_char(CRYPT_HASH64_ENC_MAP, b)? as u32) << bits;
	bits += 6;
	if bits >= 8 {
	    out.push((acc & 0xFF) as u8);
	    acc >>= 8;
	    bits -= 8;
	}
    }
    Some(out)
}

/// Encode a value in `0..64` as a single crypt(3) character.
pub fn encode_int6(val: u32) -> Option<char> {
    CRYPT_HASH64.get(val as usize).map(|&c| c as char)
}

/// Decode a single crypt(3) character into its value in `0..64`.
pub fn decode_int6(c: u8) -> Option<u32> {
    map_char(CRYPT_HASH64_ENC_MAP, c).map(u32::from)
}

const AB64_ALPHABET: Alphabet = match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789./") {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("invalid ab64 alphabet"),
};

/// Standard Base64 with `.` instead of `+` and no padding.
const AB64: GeneralPurpose = GeneralPurpose::new(&AB64_ALPHABET, NO_PAD);

pub fn ab64_encode(bs: &[u8]) -> String {
    AB64.encode(bs)
}

/// Decode an ab64 string, also accepting standard Base64, with or without
/// padding. The standard alphabet is assumed if the input contains a `+`.
pub fn ab64_decode(enc: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = enc.trim_end_matches('=');
    if trimmed.contains('+') {
	STANDARD_NO_PAD.decode(trimmed)
    } else {
	AB64.decode(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypt3_groups() {
	assert_eq!(crypt3_encode(b""), "");
	assert_eq!(crypt3_encode(&[0xff]), "z1");
	assert_eq!(crypt3_encode(&[0xff, 0xff]), "zzD");
	assert_eq!(crypt3_encode(&[0, 1, 2, 3, 4, 5, 6, 7]), ".2U.1EE/4Q.");
	assert_eq!(crypt3_encode(b"pepper"), "kJ4QkJaQ");
	assert_eq!(crypt3_encode(b"saltsaltsaltsalt"), "n34PoBLMgFrQVl4Rn34Po/");
    }

    #[test]
    fn crypt3_decoding() {
	assert_eq!(crypt3_decode("kJ4QkJaQ").unwrap(), b"pepper");
	assert_eq!(crypt3_decode("zzD").unwrap(), [0xff, 0xff]);
	assert_eq!(crypt3_decode("").unwrap(), b"");
	assert!(crypt3_decode("kJ4Q-JaQ").is_none());
	assert!(crypt3_decode("ab\u{e9}").is_none());
    }

    #[test]
    fn int6() {
	assert_eq!(decode_int6(b'.'), Some(0));
	assert_eq!(decode_int6(b'/'), Some(1));
	assert_eq!(decode_int6(b'9'), Some(11));
	assert_eq!(decode_int6(b'z'), Some(63));
	assert_eq!(decode_int6(b'@'), None);
	assert_eq!(decode_int6(b'\n'), None);
	assert_eq!(encode_int6(11), Some('9'));
	assert_eq!(encode_int6(64), None);
    }

    #[test]
    fn ab64_lenient() {
	let want = decode_std("OFvEcLOIPFd/oq8egf10i+qJLI7A8nDjPLnolCWarQY=");
	assert_eq!(ab64_decode("OFvEcLOIPFd/oq8egf10i.qJLI7A8nDjPLnolCWarQY").unwrap(), want);
	assert_eq!(ab64_decode("OFvEcLOIPFd/oq8egf10i+qJLI7A8nDjPLnolCWarQY").unwrap(), want);
	assert_eq!(ab64_decode("OFvEcLOIPFd/oq8egf10i+qJLI7A8nDjPLnolCWarQY=").unwrap(), want);
	assert_eq!(ab64_decode("cmFuZG9tc2FsdGlzaGFyZA==").unwrap(), b"randomsaltishard");
	assert_eq!(ab64_encode(&want), "OFvEcLOIPFd/oq8egf10i.qJLI7A8nDjPLnolCWarQY");
	assert!(ab64_decode("cmFu!G9t").is_err());
    }

    fn decode_std(s: &str) -> Vec<u8> {
	use base64::engine::general_purpose::STANDARD;
	STANDARD.decode(s).unwrap()
    }

    #[test]
    fn bcrypt_salt() {
	let mut salt = [0u8; 16];
	assert!(bcrypt_hash64_decode("bvIG6Nmid91Mu9RcmmWZfO", &mut salt).is_some());
	assert_eq!(bcrypt_hash64_encode(&salt), "bvIG6Nmid91Mu9RcmmWZfO");
	assert!(bcrypt_hash64_decode("bvIG6Nmid91Mu9Rc$mWZfO", &mut salt).is_none());
    }
}
