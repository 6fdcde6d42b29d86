use std::collections::HashMap;
use std::fmt;

use aes::Aes128;
use cbc::Decryptor;
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rc4::{KeyInit, Rc4, StreamCipher};

use crate::model::Object;

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

#[derive(Debug)]
pub(crate) enum CryptoError {
    Unsupported(String),
    Malformed(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::Unsupported(msg) => write!(f, "unsupported encryption: {}", msg),
            CryptoError::Malformed(msg) => write!(f, "malformed encryption data: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Standard security handler for V 1/2/4, R 2/3/4 documents. The file key is
/// derived once at construction with the empty user password, which is what
/// owner-password-only documents decrypt under.
#[derive(Debug, Clone)]
pub(crate) struct EncryptionHandler {
    version: i32,
    file_key: Vec<u8>,
}

impl EncryptionHandler {
    pub(crate) fn from_dict(
        encrypt_dict: &HashMap<String, Object>,
        file_id: &[u8],
    ) -> Result<Self, CryptoError> {
        let filter = encrypt_dict
            .get("/Filter")
            .and_then(|o| o.as_name())
            .ok_or_else(|| CryptoError::Malformed("missing /Filter".to_string()))?;
        if filter != "/Standard" {
            return Err(CryptoError::Unsupported(format!(
                "security handler {}",
                filter
            )));
        }

        let version = encrypt_dict
            .get("/V")
            .and_then(|o| o.as_i64())
            .ok_or_else(|| CryptoError::Malformed("missing /V".to_string()))? as i32;
        if !matches!(version, 1 | 2 | 4) {
            return Err(CryptoError::Unsupported(format!(
                "encryption version V={}",
                version
            )));
        }

        let revision = encrypt_dict
            .get("/R")
            .and_then(|o| o.as_i64())
            .ok_or_else(|| CryptoError::Malformed("missing /R".to_string()))? as i32;
        if !matches!(revision, 2 | 3 | 4) {
            return Err(CryptoError::Unsupported(format!(
                "Standard handler revision R={}",
                revision
            )));
        }

        let o = encrypt_dict
            .get("/O")
            .and_then(|v| v.as_string_bytes())
            .ok_or_else(|| CryptoError::Malformed("missing /O".to_string()))?;
        let u = encrypt_dict
            .get("/U")
            .and_then(|v| v.as_string_bytes())
            .ok_or_else(|| CryptoError::Malformed("missing /U".to_string()))?;
        if o.len() < 32 || u.len() < 16 {
            return Err(CryptoError::Malformed(
                "unexpected /O or /U length".to_string(),
            ));
        }

        let permissions = encrypt_dict
            .get("/P")
            .and_then(|o| o.as_i64())
            .ok_or_else(|| CryptoError::Malformed("missing /P".to_string()))?
            as i32;

        let key_len_bits = encrypt_dict
            .get("/Length")
            .and_then(|o| o.as_i64())
            .unwrap_or(if revision == 2 { 40 } else { 128 });
        if key_len_bits <= 0 || key_len_bits % 8 != 0 {
            return Err(CryptoError::Malformed("invalid /Length".to_string()));
        }
        let key_len = (key_len_bits / 8) as usize;
        if key_len == 0 || key_len > 16 {
            return Err(CryptoError::Malformed(
                "unsupported key length for R2-R4".to_string(),
            ));
        }
        let key_len = if version == 1 { 5 } else { key_len };

        let encrypt_metadata = encrypt_dict
            .get("/EncryptMetadata")
            .and_then(|o| match o {
                Object::Boolean(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(true);

        let file_key = derive_file_key(
            &[],
            o,
            permissions,
            file_id,
            revision,
            key_len,
            encrypt_metadata,
        );

        Ok(Self { version, file_key })
    }

    /// Decrypts one object's payload with its per-object key. Empty input
    /// stays empty; AES input needs at least the 16-byte IV.
    pub(crate) fn decrypt(
        &self,
        data: &[u8],
        obj_num: u32,
        gen_num: u16,
    ) -> Result<Vec<u8>, CryptoError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self.version {
            1 | 2 => {
                let mut out = data.to_vec();
                let obj_key = self.object_key(obj_num, gen_num);
                rc4_apply(&obj_key, &mut out)?;
                Ok(out)
            }
            4 => {
                if data.len() < 16 {
                    return Err(CryptoError::Malformed(format!(
                        "AES payload too short for IV ({} bytes)",
                        data.len()
                    )));
                }
                let obj_key = self.object_key(obj_num, gen_num);
                let iv = &data[..16];
                let mut encrypted = data[16..].to_vec();
                let decryptor = Decryptor::<Aes128>::new_from_slices(&obj_key, iv)
                    .map_err(|_| CryptoError::Malformed("invalid AES key/iv length".to_string()))?;
                let plaintext = decryptor
                    .decrypt_padded_mut::<NoPadding>(&mut encrypted)
                    .map_err(|_| {
                        CryptoError::Malformed("AES ciphertext not block-aligned".to_string())
                    })?
                    .to_vec();
                Ok(remove_pkcs7_padding(plaintext))
            }
            other => Err(CryptoError::Unsupported(format!(
                "encryption version V={}",
                other
            ))),
        }
    }

    /// Algorithm 1: file key, object number (3 bytes LE), generation
    /// (2 bytes LE), plus the AES salt for V4, hashed and truncated.
    fn object_key(&self, obj_num: u32, gen_num: u16) -> Vec<u8> {
        let mut material = Vec::with_capacity(self.file_key.len() + 9);
        material.extend_from_slice(&self.file_key);
        material.push((obj_num & 0xFF) as u8);
        material.push(((obj_num >> 8) & 0xFF) as u8);
        material.push(((obj_num >> 16) & 0xFF) as u8);
        material.push((gen_num & 0xFF) as u8);
        material.push(((gen_num >> 8) & 0xFF) as u8);
        if self.version >= 4 {
            material.extend_from_slice(b"sAlT");
        }
        let digest = md5_sum(&material);
        let key_len = (self.file_key.len() + 5).min(16);
        digest[..key_len].to_vec()
    }
}

/// Algorithm 2: MD5 over padded password, /O, /P (LE), file ID, and the
/// metadata marker, with the R>=3 re-hash loop.
fn derive_file_key(
    password: &[u8],
    o: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: i32,
    key_len: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(32 + o.len() + 4 + file_id.len() + 4);
    input.extend_from_slice(&pad_password(password));
    input.extend_from_slice(o);
    input.extend_from_slice(&permissions.to_le_bytes());
    input.extend_from_slice(file_id);
    if revision >= 4 && !encrypt_metadata {
        input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    let mut digest = md5_sum(&input).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            digest = md5_sum(&digest[..key_len]).to_vec();
        }
    }
    digest[..key_len].to_vec()
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = PASSWORD_PADDING;
    let copy_len = password.len().min(32);
    out[..copy_len].copy_from_slice(&password[..copy_len]);
    out
}

fn md5_sum(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

/// Strips PKCS#7 padding when it checks out; anything inconsistent passes
/// the data through unchanged.
fn remove_pkcs7_padding(data: Vec<u8>) -> Vec<u8> {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad = last as usize;
    if pad == 0 || pad > 16 || pad > data.len() {
        return data;
    }
    if data[data.len() - pad..].iter().any(|&b| b != last) {
        return data;
    }
    let mut data = data;
    data.truncate(data.len() - pad);
    data
}

fn rc4_apply(key: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
    match key.len() {
        1 => rc4_apply_sized::<rc4::consts::U1>(key, data),
        2 => rc4_apply_sized::<rc4::consts::U2>(key, data),
        3 => rc4_apply_sized::<rc4::consts::U3>(key, data),
        4 => rc4_apply_sized::<rc4::consts::U4>(key, data),
        5 => rc4_apply_sized::<rc4::consts::U5>(key, data),
        6 => rc4_apply_sized::<rc4::consts::U6>(key, data),
        7 => rc4_apply_sized::<rc4::consts::U7>(key, data),
        8 => rc4_apply_sized::<rc4::consts::U8>(key, data),
        9 => rc4_apply_sized::<rc4::consts::U9>(key, data),
        10 => rc4_apply_sized::<rc4::consts::U10>(key, data),
        11 => rc4_apply_sized::<rc4::consts::U11>(key, data),
        12 => rc4_apply_sized::<rc4::consts::U12>(key, data),
        13 => rc4_apply_sized::<rc4::consts::U13>(key, data),
        14 => rc4_apply_sized::<rc4::consts::U14>(key, data),
        15 => rc4_apply_sized::<rc4::consts::U15>(key, data),
        16 => rc4_apply_sized::<rc4::consts::U16>(key, data),
        other => Err(CryptoError::Malformed(format!(
            "unsupported RC4 key length {}",
            other
        ))),
    }
}

fn rc4_apply_sized<K>(key: &[u8], data: &mut [u8]) -> Result<(), CryptoError>
where
    Rc4<K>: KeyInit + StreamCipher,
{
    let mut cipher = Rc4::<K>::new_from_slice(key)
        .map_err(|_| CryptoError::Malformed("invalid RC4 key".to_string()))?;
    cipher.apply_keystream(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::Encryptor;
    use cipher::BlockEncryptMut;
    use cipher::block_padding::Pkcs7;

    fn handler_v4() -> EncryptionHandler {
        EncryptionHandler {
            version: 4,
            file_key: (0u8..16).collect(),
        }
    }

    #[test]
    fn rc4_roundtrip() {
        let key = b"abcde";
        let plain = b"hello world";
        let mut data = plain.to_vec();
        rc4_apply(key, &mut data).expect("encrypt");
        assert_ne!(data, plain);
        rc4_apply(key, &mut data).expect("decrypt");
        assert_eq!(data, plain);
    }

    #[test]
    fn file_key_is_deterministic() {
        let o = [0x5Au8; 32];
        let id = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let a = derive_file_key(b"", &o, -4, &id, 3, 16, true);
        let b = derive_file_key(b"", &o, -4, &id, 3, 16, true);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        // Flipping any derivation input must change the key.
        assert_ne!(a, derive_file_key(b"", &o, -8, &id, 3, 16, true));
        assert_ne!(a, derive_file_key(b"", &o, -4, &id, 4, 16, false));
        assert_ne!(a[..5], derive_file_key(b"", &o, -4, &id, 2, 5, true)[..]);
    }

    #[test]
    fn object_key_length_is_min_of_key_plus_five_and_sixteen() {
        let short = EncryptionHandler {
            version: 1,
            file_key: vec![0; 5],
        };
        assert_eq!(short.object_key(1, 0).len(), 10);

        let long = EncryptionHandler {
            version: 2,
            file_key: vec![0; 16],
        };
        assert_eq!(long.object_key(1, 0).len(), 16);
    }

    #[test]
    fn aes_roundtrip_for_object_bytes() {
        let handler = handler_v4();
        let obj_key = handler.object_key(42, 0);
        assert_eq!(obj_key.len(), 16);

        let plaintext = b"BT /F1 12 Tf (Hello) Tj ET";
        let iv = [7u8; 16];
        let mut padded = vec![0u8; plaintext.len() + 16];
        padded[..plaintext.len()].copy_from_slice(plaintext);
        let encryptor = Encryptor::<Aes128>::new_from_slices(&obj_key, &iv).expect("cipher");
        let ciphertext = encryptor
            .encrypt_padded_mut::<Pkcs7>(&mut padded, plaintext.len())
            .expect("padded");

        let mut payload = iv.to_vec();
        payload.extend_from_slice(ciphertext);

        let decrypted = handler.decrypt(&payload, 42, 0).expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn aes_iv_only_payload_decrypts_to_empty() {
        let handler = handler_v4();
        let decrypted = handler.decrypt(&[9u8; 16], 1, 0).expect("decrypt");
        assert!(decrypted.is_empty());
    }

    #[test]
    fn aes_payload_shorter_than_iv_fails() {
        let handler = handler_v4();
        assert!(handler.decrypt(&[0u8; 8], 1, 0).is_err());
    }

    #[test]
    fn empty_input_stays_empty() {
        let handler = handler_v4();
        assert_eq!(handler.decrypt(&[], 1, 0).expect("decrypt"), Vec::<u8>::new());
    }

    #[test]
    fn invalid_pkcs7_padding_passes_through() {
        assert_eq!(remove_pkcs7_padding(vec![1, 2, 0xFF]), vec![1, 2, 0xFF]);
        assert_eq!(remove_pkcs7_padding(vec![1, 2, 2, 3]), vec![1, 2, 2, 3]);
        assert_eq!(remove_pkcs7_padding(vec![1, 2, 2, 2]), vec![1, 2]);
        assert_eq!(remove_pkcs7_padding(vec![0x10; 16]), Vec::<u8>::new());
    }
}
