// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Hash primitives behind the SCRAM family.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use sha1::{Digest, Sha1 as Sha1Hash};
use sha2::Sha256 as Sha256Hash;

/// Failure of a hash primitive.
#[derive(Debug, PartialEq, Eq)]
pub enum DeriveError {
    /// The random number generator of the platform failed.
    RandomFailure,
    /// A key or output length was refused by the primitive.
    InvalidLength,
}

impl fmt::Display for DeriveError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeriveError::RandomFailure => write!(fmt, "failed to generate random data"),
            DeriveError::InvalidLength => write!(fmt, "invalid key length"),
        }
    }
}

impl core::error::Error for DeriveError {}

/// Generate a printable client nonce.
pub fn generate_nonce() -> Result<String, DeriveError> {
    let mut data = [0u8; 32];
    getrandom::getrandom(&mut data).map_err(|_| DeriveError::RandomFailure)?;
    Ok(Base64.encode(data))
}

/// A hash function SCRAM can be instantiated with.
pub trait ScramProvider {
    /// Mechanism name, such as `SCRAM-SHA-1`.
    fn name() -> &'static str;

    /// `H(data)`.
    fn hash(data: &[u8]) -> Vec<u8>;

    /// `HMAC(key, data)`.
    fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DeriveError>;

    /// `Hi(password, salt, iterations)`.
    fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError>;
}

/// SCRAM with SHA-1.
pub struct Sha1;

impl ScramProvider for Sha1 {
    fn name() -> &'static str {
        "SCRAM-SHA-1"
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha1Hash::digest(data).to_vec()
    }

    fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DeriveError> {
        let mut mac =
            Hmac::<Sha1Hash>::new_from_slice(key).map_err(|_| DeriveError::InvalidLength)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError> {
        let mut result = alloc::vec![0; 20];
        pbkdf2::<Hmac<Sha1Hash>>(password, salt, iterations, &mut result)
            .map_err(|_| DeriveError::InvalidLength)?;
        Ok(result)
    }
}

/// SCRAM with SHA-256.
pub struct Sha256;

impl ScramProvider for Sha256 {
    fn name() -> &'static str {
        "SCRAM-SHA-256"
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha256Hash::digest(data).to_vec()
    }

    fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DeriveError> {
        let mut mac =
            Hmac::<Sha256Hash>::new_from_slice(key).map_err(|_| DeriveError::InvalidLength)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError> {
        let mut result = alloc::vec![0; 32];
        pbkdf2::<Hmac<Sha256Hash>>(password, salt, iterations, &mut result)
            .map_err(|_| DeriveError::InvalidLength)?;
        Ok(result)
    }
}

/// Bytewise XOR of two equally long slices.
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}
