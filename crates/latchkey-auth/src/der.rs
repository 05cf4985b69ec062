//! Minimal DER handling for ECDSA signatures and EC private keys.

use crate::jwt::TokenError;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_PARAMETERS: u8 = 0xa0;
const TAG_PUBLIC_KEY: u8 = 0xa1;

/// id-ecPublicKey (1.2.840.10045.2.1)
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// prime256v1 (1.2.840.10045.3.1.7)
const OID_PRIME256V1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn peek(&self, tag: u8) -> bool {
        self.data.first() == Some(&tag)
    }

    /// Read one element with the expected tag and return its contents.
    fn read(&mut self, tag: u8) -> Option<&'a [u8]> {
        let (&actual, rest) = self.data.split_first()?;
        if actual != tag {
            return None;
        }
        let (&first, mut rest) = rest.split_first()?;
        let len = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 2 || rest.len() < count {
                return None;
            }
            let len = rest[..count]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            // Long form must not encode short lengths.
            if len < 0x80 || (count == 2 && len < 0x100) {
                return None;
            }
            rest = &rest[count..];
            len
        };
        if rest.len() < len {
            return None;
        }
        let (contents, remaining) = rest.split_at(len);
        self.data = remaining;
        Some(contents)
    }
}

fn write(tag: u8, contents: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    let len = contents.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(contents);
}

fn malformed(what: &str) -> TokenError {
    TokenError::InvalidKey(format!("malformed DER {}", what))
}

/// Convert a DER `SEQUENCE { INTEGER r, INTEGER s }` into fixed-width `r || s`.
///
/// Each integer is normalized to `width` bytes: sign-padding zeros are dropped
/// and short values are left-padded.
pub fn der_to_jose(der: &[u8], width: usize) -> Result<Vec<u8>, TokenError> {
    let mut outer = Reader::new(der);
    let sequence = outer
        .read(TAG_SEQUENCE)
        .ok_or_else(|| malformed("signature"))?;
    if !outer.is_empty() {
        return Err(malformed("signature: trailing data"));
    }

    let mut inner = Reader::new(sequence);
    let r = inner.read(TAG_INTEGER).ok_or_else(|| malformed("signature: r"))?;
    let s = inner.read(TAG_INTEGER).ok_or_else(|| malformed("signature: s"))?;
    if !inner.is_empty() {
        return Err(malformed("signature: extra elements"));
    }

    let mut jose = Vec::with_capacity(width * 2);
    push_fixed(r, width, &mut jose)?;
    push_fixed(s, width, &mut jose)?;
    Ok(jose)
}

fn push_fixed(integer: &[u8], width: usize, out: &mut Vec<u8>) -> Result<(), TokenError> {
    if integer.is_empty() {
        return Err(malformed("signature: empty integer"));
    }
    let excess = integer.len().saturating_sub(width);
    if integer[..excess].iter().any(|b| *b != 0) {
        return Err(malformed("signature: integer wider than curve"));
    }
    let value = &integer[excess..];
    out.resize(out.len() + (width - value.len()), 0);
    out.extend_from_slice(value);
    Ok(())
}

/// Wrap a SEC1 `ECPrivateKey` for P-256 into a PKCS#8 document.
///
/// The curve moves into the algorithm identifier, so the optional `[0]`
/// parameters element is dropped from the inner key. Keys naming another curve
/// are rejected.
pub fn sec1_to_pkcs8(sec1: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut outer = Reader::new(sec1);
    let body = outer
        .read(TAG_SEQUENCE)
        .ok_or_else(|| malformed("EC private key"))?;

    let mut reader = Reader::new(body);
    let version = reader
        .read(TAG_INTEGER)
        .ok_or_else(|| malformed("EC private key: version"))?;
    if version != [1] {
        return Err(TokenError::InvalidKey(
            "unsupported EC private key version".to_string(),
        ));
    }
    let private = reader
        .read(TAG_OCTET_STRING)
        .ok_or_else(|| malformed("EC private key: private scalar"))?;

    if reader.peek(TAG_PARAMETERS) {
        let parameters = reader
            .read(TAG_PARAMETERS)
            .ok_or_else(|| malformed("EC private key: parameters"))?;
        let curve = Reader::new(parameters)
            .read(TAG_OID)
            .ok_or_else(|| malformed("EC private key: curve"))?;
        if curve != OID_PRIME256V1 {
            return Err(TokenError::InvalidKey(
                "ES256 requires a P-256 key".to_string(),
            ));
        }
    }

    let mut ec_private_key = Vec::with_capacity(body.len());
    write(TAG_INTEGER, version, &mut ec_private_key);
    write(TAG_OCTET_STRING, private, &mut ec_private_key);
    if reader.peek(TAG_PUBLIC_KEY) {
        let public = reader
            .read(TAG_PUBLIC_KEY)
            .ok_or_else(|| malformed("EC private key: public key"))?;
        write(TAG_PUBLIC_KEY, public, &mut ec_private_key);
    }
    let mut ec_private_key_seq = Vec::new();
    write(TAG_SEQUENCE, &ec_private_key, &mut ec_private_key_seq);

    let mut algorithm = Vec::new();
    write(TAG_OID, OID_EC_PUBLIC_KEY, &mut algorithm);
    write(TAG_OID, OID_PRIME256V1, &mut algorithm);

    let mut info = Vec::new();
    write(TAG_INTEGER, &[0], &mut info);
    write(TAG_SEQUENCE, &algorithm, &mut info);
    write(TAG_OCTET_STRING, &ec_private_key_seq, &mut info);

    let mut pkcs8 = Vec::with_capacity(info.len() + 3);
    write(TAG_SEQUENCE, &info, &mut pkcs8);
    Ok(pkcs8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_der_to_jose_strips_sign_padding() {
        let mut der = vec![0x30, 0x45, 0x02, 0x21, 0x00];
        der.extend([0x80; 32]);
        der.extend([0x02, 0x20]);
        der.extend([0x11; 32]);

        let jose = der_to_jose(&der, 32).unwrap();
        assert_eq!(jose.len(), 64);
        assert_eq!(&jose[..32], &[0x80; 32]);
        assert_eq!(&jose[32..], &[0x11; 32]);
    }

    #[test]
    fn test_der_to_jose_left_pads_short_integers() {
        let der = [0x30, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07];
        let jose = der_to_jose(&der, 4).unwrap();
        assert_eq!(jose, vec![0, 0, 0, 5, 0, 0, 0, 7]);
    }

    #[test]
    fn test_der_to_jose_rejects_malformed() {
        let cases: &[&[u8]] = &[
            &[],
            &[0x31, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07],
            &[0x30, 0x07, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07],
            &[0x30, 0x03, 0x02, 0x01, 0x05],
            &[0x30, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07, 0x00],
            &[0x30, 0x05, 0x02, 0x00, 0x02, 0x01, 0x07],
            // r does not fit in 2 bytes
            &[0x30, 0x08, 0x02, 0x03, 0x01, 0x02, 0x03, 0x02, 0x01, 0x07],
        ];
        for der in cases {
            assert!(der_to_jose(der, 2).is_err(), "{:02x?}", der);
        }
    }

    #[test]
    fn test_sec1_to_pkcs8_matches_openssl() {
        // `openssl ec -outform der` and `openssl pkcs8 -topk8 -nocrypt -outform der`
        // of the same key.
        let sec1 = hex(
            "307702010104202d3ec91d8f7c75855a06fd07f58f7e4b536a929b45a28cd9cf611bf810d62359\
             a00a06082a8648ce3d030107a144034200047d696392dbe42d455be3aa34dfd3644bc40cac3135\
             43a46f38fda3f9cb332fdbe63c954ab7ddd838d62bcc2296a925c0eed4029e6e10250019e333da\
             e33c0994",
        );
        let pkcs8 = hex(
            "308187020100301306072a8648ce3d020106082a8648ce3d030107046d306b02010104202d3ec9\
             1d8f7c75855a06fd07f58f7e4b536a929b45a28cd9cf611bf810d62359a144034200047d696392\
             dbe42d455be3aa34dfd3644bc40cac313543a46f38fda3f9cb332fdbe63c954ab7ddd838d62bcc\
             2296a925c0eed4029e6e10250019e333dae33c0994",
        );

        assert_eq!(sec1_to_pkcs8(&sec1).unwrap(), pkcs8);
    }

    #[test]
    fn test_sec1_to_pkcs8_rejects_other_curves() {
        // secp384r1 parameters
        let mut sec1 = vec![0x30, 0x0f, 0x02, 0x01, 0x01, 0x04, 0x01, 0x01, 0xa0, 0x07, 0x06, 0x05];
        sec1.extend([0x2b, 0x81, 0x04, 0x00, 0x22]);
        let err = sec1_to_pkcs8(&sec1).unwrap_err();
        assert!(err.to_string().contains("P-256"), "{}", err);
    }
}
