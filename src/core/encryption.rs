//! Standard security handler for RC4 encrypted documents.
//!
//! Supports revisions 2 to 4 of the standard handler with RC4 stream
//! encryption. AES crypt filters and the revision 5/6 handlers are reported
//! as unsupported security schemes.

use super::crypto::{calculate_md5, rc4};
use super::error::{PDFError, PDFResult};
use super::parser::{Dict, PDFObject};

/// Padding string appended to passwords shorter than 32 bytes.
const DEFAULT_PASSWORD_PAD: [u8; 32] = [
    0x28, 0xbf, 0x4e, 0x5e, 0x4e, 0x75, 0x8a, 0x41, 0x64, 0x00, 0x4e, 0x56, 0xff, 0xfa, 0x01, 0x08,
    0x2e, 0x2e, 0x00, 0xb6, 0xd0, 0x68, 0x3e, 0x80, 0x2f, 0x0c, 0xa9, 0xfe, 0x64, 0x53, 0x69, 0x7a,
];

/// How streams are protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCipher {
    /// Streams are stored in the clear
    Identity,
    Rc4,
}

/// Parameters of a `/Filter /Standard` encryption dictionary.
#[derive(Debug, Clone)]
pub struct StandardSecurity {
    pub version: i64,
    pub revision: i64,
    /// File key length in bytes
    pub key_length: usize,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub p: i32,
    pub encrypt_metadata: bool,
    pub stream_cipher: StreamCipher,
    /// First element of the trailer `/ID` array, empty if absent
    pub file_id: Vec<u8>,
}

impl StandardSecurity {
    /// Parses an `/Encrypt` dictionary.
    pub fn from_dict(dict: &Dict, file_id: &[u8]) -> PDFResult<Self> {
        let filter = dict.get("Filter").and_then(PDFObject::as_name).unwrap_or("");
        if filter != "Standard" {
            return Err(PDFError::UnsupportedSecurity(format!(
                "security handler '{}'",
                filter
            )));
        }

        let int = |key: &str| dict.get(key).and_then(PDFObject::as_int);
        let version = int("V").unwrap_or(0);
        let revision = int("R")
            .ok_or_else(|| PDFError::parse("Missing /R in encryption dictionary"))?;

        if !(2..=4).contains(&revision) {
            return Err(PDFError::UnsupportedSecurity(format!("revision {}", revision)));
        }

        let (key_length, stream_cipher) = match version {
            1 => (5, StreamCipher::Rc4),
            2 => {
                let bits = int("Length").unwrap_or(40);
                if bits % 8 != 0 || !(40..=128).contains(&bits) {
                    return Err(PDFError::parse(format!("Invalid key length {}", bits)));
                }
                ((bits / 8) as usize, StreamCipher::Rc4)
            }
            4 => (16, Self::crypt_filter(dict)?),
            other => {
                return Err(PDFError::UnsupportedSecurity(format!("version {}", other)));
            }
        };

        let bytes = |key: &str| {
            dict.get(key)
                .and_then(PDFObject::as_bytes)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| {
                    PDFError::parse(format!("Missing /{} in encryption dictionary", key))
                })
        };
        let o = bytes("O")?;
        let u = bytes("U")?;
        if o.len() < 32 || u.len() < 32 {
            return Err(PDFError::parse("/O and /U must be at least 32 bytes"));
        }

        let p = int("P").ok_or_else(|| PDFError::parse("Missing /P in encryption dictionary"))?;

        Ok(StandardSecurity {
            version,
            revision,
            key_length,
            o,
            u,
            p: p as i32,
            encrypt_metadata: !matches!(
                dict.get("EncryptMetadata"),
                Some(PDFObject::Boolean(false))
            ),
            stream_cipher,
            file_id: file_id.to_vec(),
        })
    }

    /// Resolves the stream crypt filter of a version 4 dictionary.
    fn crypt_filter(dict: &Dict) -> PDFResult<StreamCipher> {
        let name = dict.get("StmF").and_then(PDFObject::as_name).unwrap_or("Identity");
        if name == "Identity" {
            return Ok(StreamCipher::Identity);
        }

        let method = dict
            .get("CF")
            .and_then(|cf| cf.get(name))
            .and_then(|filter| filter.get("CFM"))
            .and_then(PDFObject::as_name)
            .unwrap_or("None");

        match method {
            "V2" => Ok(StreamCipher::Rc4),
            "None" => Ok(StreamCipher::Identity),
            other => Err(PDFError::UnsupportedSecurity(format!("crypt filter method {}", other))),
        }
    }

    /// Computes the file key for `password` (algorithm 2).
    fn compute_key(&self, padded_password: &[u8; 32]) -> Vec<u8> {
        let mut ctx = md5::Context::new();
        ctx.consume(padded_password);
        ctx.consume(&self.o[..32]);
        ctx.consume((self.p as u32).to_le_bytes());
        ctx.consume(&self.file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            ctx.consume([0xFFu8; 4]);
        }
        let mut hash = ctx.compute().0;

        if self.revision >= 3 {
            for _ in 0..50 {
                hash = calculate_md5(&hash[..self.key_length]);
            }
        }

        hash[..self.key_length].to_vec()
    }

    /// Checks a user password, returning the file key on success
    /// (algorithms 4 and 5).
    fn check_user_password(&self, padded_password: &[u8; 32]) -> Option<Vec<u8>> {
        let key = self.compute_key(padded_password);

        let matches = if self.revision == 2 {
            rc4(&key, &DEFAULT_PASSWORD_PAD) == self.u[..32]
        } else {
            let mut ctx = md5::Context::new();
            ctx.consume(DEFAULT_PASSWORD_PAD);
            ctx.consume(&self.file_id);
            let mut check = rc4(&key, &ctx.compute().0);
            for i in 1..=19u8 {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                check = rc4(&round_key, &check);
            }
            check[..16] == self.u[..16]
        };

        matches.then_some(key)
    }

    /// Recovers the padded user password from an owner password
    /// (algorithm 7, first half).
    fn decode_user_password(&self, padded_owner: &[u8; 32]) -> [u8; 32] {
        let mut hash = calculate_md5(padded_owner);
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = calculate_md5(&hash);
            }
        }
        let key = &hash[..self.key_length];

        let user = if self.revision == 2 {
            rc4(key, &self.o[..32])
        } else {
            let mut data = self.o[..32].to_vec();
            for i in (0..=19u8).rev() {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                data = rc4(&round_key, &data);
            }
            data
        };

        let mut padded = [0u8; 32];
        padded.copy_from_slice(&user[..32]);
        padded
    }

    /// Authenticates `password` as the user password, then as the owner
    /// password.
    pub fn authenticate(&self, password: &[u8]) -> PDFResult<Decryptor> {
        let padded = pad_password(password);

        if let Some(key) = self.check_user_password(&padded) {
            log::debug!("authenticated with user password");
            return Ok(Decryptor::new(key, self.stream_cipher));
        }

        let user = self.decode_user_password(&padded);
        if let Some(key) = self.check_user_password(&user) {
            log::debug!("authenticated with owner password");
            return Ok(Decryptor::new(key, self.stream_cipher));
        }

        Err(PDFError::Password)
    }
}

/// Decrypts stream data with per-object keys derived from the file key.
#[derive(Debug, Clone)]
pub struct Decryptor {
    key: Vec<u8>,
    stream_cipher: StreamCipher,
}

impl Decryptor {
    pub fn new(key: Vec<u8>, stream_cipher: StreamCipher) -> Self {
        Decryptor { key, stream_cipher }
    }

    pub fn file_key(&self) -> &[u8] {
        &self.key
    }

    /// Builds the key for object `num`/`generation` (algorithm 1).
    pub fn object_key(&self, num: u32, generation: u32) -> Vec<u8> {
        let mut ctx = md5::Context::new();
        ctx.consume(&self.key);
        ctx.consume(&num.to_le_bytes()[..3]);
        ctx.consume(&generation.to_le_bytes()[..2]);
        let hash = ctx.compute().0;
        hash[..(self.key.len() + 5).min(16)].to_vec()
    }

    pub fn decrypt_stream(&self, data: &[u8], num: u32, generation: u32) -> Vec<u8> {
        match self.stream_cipher {
            StreamCipher::Identity => data.to_vec(),
            StreamCipher::Rc4 => rc4(&self.object_key(num, generation), data),
        }
    }
}

/// Pads a password to exactly 32 bytes using the default password padding.
fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = DEFAULT_PASSWORD_PAD;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&DEFAULT_PASSWORD_PAD[..32 - len]);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes /O and /U for the given passwords the way a PDF producer does.
    fn producer_values(
        user: &[u8],
        owner: &[u8],
        revision: i64,
        key_length: usize,
        p: i32,
        file_id: &[u8],
    ) -> (Vec<u8>, Vec<u8>) {
        let mut hash = calculate_md5(&pad_password(owner));
        if revision >= 3 {
            for _ in 0..50 {
                hash = calculate_md5(&hash);
            }
        }
        let owner_key = &hash[..key_length];
        let mut o = rc4(owner_key, &pad_password(user));
        if revision >= 3 {
            for i in 1..=19u8 {
                let round_key: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
                o = rc4(&round_key, &o);
            }
        }

        let partial = StandardSecurity {
            version: if revision == 2 { 1 } else { 2 },
            revision,
            key_length,
            o: o.clone(),
            u: vec![0; 32],
            p,
            encrypt_metadata: true,
            stream_cipher: StreamCipher::Rc4,
            file_id: file_id.to_vec(),
        };
        let key = partial.compute_key(&pad_password(user));
        let u = if revision == 2 {
            rc4(&key, &DEFAULT_PASSWORD_PAD)
        } else {
            let mut seed = DEFAULT_PASSWORD_PAD.to_vec();
            seed.extend_from_slice(file_id);
            let mut u = rc4(&key, &calculate_md5(&seed));
            for i in 1..=19u8 {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                u = rc4(&round_key, &u);
            }
            u.resize(32, 0);
            u
        };
        (o, u)
    }

    fn encrypt_dict(revision: i64, key_bits: i64, o: Vec<u8>, u: Vec<u8>, p: i32) -> Dict {
        let mut dict = Dict::default();
        dict.insert("Filter".into(), PDFObject::Name("Standard".into()));
        dict.insert("V".into(), PDFObject::Number(if revision == 2 { 1.0 } else { 2.0 }));
        dict.insert("R".into(), PDFObject::Number(revision as f64));
        dict.insert("Length".into(), PDFObject::Number(key_bits as f64));
        dict.insert("O".into(), PDFObject::String(o));
        dict.insert("U".into(), PDFObject::String(u));
        dict.insert("P".into(), PDFObject::Number(p as f64));
        dict
    }

    #[test]
    fn test_pad_password() {
        assert_eq!(pad_password(b""), DEFAULT_PASSWORD_PAD);
        let padded = pad_password(b"ab");
        assert_eq!(&padded[..2], b"ab");
        assert_eq!(&padded[2..], &DEFAULT_PASSWORD_PAD[..30]);
    }

    #[test]
    fn test_r3_user_and_owner_passwords() {
        let id = b"0123456789abcdef";
        let (o, u) = producer_values(b"user", b"owner", 3, 16, -4, id);
        let security = StandardSecurity::from_dict(&encrypt_dict(3, 128, o, u, -4), id).unwrap();

        let by_user = security.authenticate(b"user").unwrap();
        let by_owner = security.authenticate(b"owner").unwrap();
        assert_eq!(by_user.file_key(), by_owner.file_key());
        assert!(matches!(security.authenticate(b"wrong"), Err(PDFError::Password)));
    }

    #[test]
    fn test_r2_empty_user_password() {
        let (o, u) = producer_values(b"", b"owner", 2, 5, -1, b"");
        let security = StandardSecurity::from_dict(&encrypt_dict(2, 40, o, u, -1), b"").unwrap();

        assert_eq!(security.key_length, 5);
        assert!(security.authenticate(b"").is_ok());
        assert!(security.authenticate(b"owner").is_ok());
        assert!(security.authenticate(b"nope").is_err());
    }

    #[test]
    fn test_unsupported_schemes() {
        let (o, u) = producer_values(b"", b"", 3, 16, -4, b"");
        let mut dict = encrypt_dict(3, 128, o, u, -4);

        dict.insert("V".into(), PDFObject::Number(5.0));
        dict.insert("R".into(), PDFObject::Number(6.0));
        assert!(matches!(
            StandardSecurity::from_dict(&dict, b""),
            Err(PDFError::UnsupportedSecurity(_))
        ));

        dict.insert("Filter".into(), PDFObject::Name("Adobe.PubSec".into()));
        assert!(matches!(
            StandardSecurity::from_dict(&dict, b""),
            Err(PDFError::UnsupportedSecurity(_))
        ));
    }

    #[test]
    fn test_v4_aes_is_unsupported() {
        let (o, u) = producer_values(b"", b"", 4, 16, -4, b"");
        let mut dict = encrypt_dict(4, 128, o, u, -4);
        let mut std_cf = Dict::default();
        std_cf.insert("CFM".into(), PDFObject::Name("AESV2".into()));
        let mut cf = Dict::default();
        cf.insert("StdCF".into(), PDFObject::Dictionary(std_cf));
        dict.insert("V".into(), PDFObject::Number(4.0));
        dict.insert("CF".into(), PDFObject::Dictionary(cf));
        dict.insert("StmF".into(), PDFObject::Name("StdCF".into()));

        assert!(matches!(
            StandardSecurity::from_dict(&dict, b""),
            Err(PDFError::UnsupportedSecurity(_))
        ));
    }

    #[test]
    fn test_object_key_round_trip() {
        let decryptor = Decryptor::new(vec![1, 2, 3, 4, 5], StreamCipher::Rc4);
        assert_eq!(decryptor.object_key(7, 0).len(), 10);

        let encrypted = rc4(&decryptor.object_key(7, 0), b"1 0 2 5 << >>");
        assert_eq!(decryptor.decrypt_stream(&encrypted, 7, 0), b"1 0 2 5 << >>".to_vec());
        assert_ne!(decryptor.decrypt_stream(&encrypted, 8, 0), b"1 0 2 5 << >>".to_vec());
    }
}
