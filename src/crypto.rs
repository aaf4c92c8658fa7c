//! Encryption-at-rest interface
//!
//! Encryption is delegated to an external age-style tool; the core only
//! defines the opaque transform it must provide. The store applies the
//! cipher around file I/O when one is installed (see
//! [`crate::store::NoteStore::set_cipher`]).

use crate::error::Result;
use crate::id::NoteId;

/// Opaque content transform provided by an external encryption tool
///
/// `decrypt(encrypt(x)) == x` must hold for every note. The note id is
/// available for use as additional authenticated data. Failures surface as
/// `encryption_error`.
pub trait NoteCipher {
    fn encrypt(&self, id: &NoteId, plaintext: &str) -> Result<String>;
    fn decrypt(&self, id: &NoteId, ciphertext: &str) -> Result<String>;
}
