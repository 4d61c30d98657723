use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub fn sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

pub fn hmac_sha256(key: &[u8], msg: &str) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub fn hmac_sha256_verify(key: &[u8], msg: &str, tag: &[u8]) -> bool {
    let mut mac = match Hmac::<Sha256>::new_from_slice(key) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(msg.as_bytes());
    mac.verify_slice(tag).is_ok()
}

pub fn base64_encode<T: AsRef<[u8]>>(input: T) -> String {
    STANDARD.encode(input)
}

pub fn base64_decode<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        assert_eq!(
            sha256("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hmac_sha256_verify() {
        let tag = hmac_sha256(b"secret", "payload");
        assert!(hmac_sha256_verify(b"secret", "payload", &tag));
        assert!(!hmac_sha256_verify(b"secret", "tampered", &tag));
        assert!(!hmac_sha256_verify(b"other", "payload", &tag));
    }
}
