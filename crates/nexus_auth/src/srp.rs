//! SRP6 arithmetic over the standard 2048-bit group (g = 2), SHA-256
//! digests throughout.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::{AuthError, AuthSuccess};

/// The 2048-bit safe prime from RFC 5054, appendix A.
const N_HEX: &str = "\
AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050\
A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50\
E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B8\
55F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773B\
CA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748\
544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6\
AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB6\
94B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";

const G: u32 = 2;

fn group_n() -> BigUint {
    BigUint::parse_bytes(N_HEX.as_bytes(), 16).expect("group modulus parses")
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().into()
}

fn hash_to_int(parts: &[&[u8]]) -> BigUint {
    BigUint::from_bytes_be(&sha256(parts))
}

/// `k = H(N | g)`, the SRP6a multiplier.
fn multiplier(n: &BigUint) -> BigUint {
    hash_to_int(&[&n.to_bytes_be(), &[G as u8]])
}

/// Derives the private credential exponent `x = H(salt | H(email:password))`.
pub fn private_key(email: &str, password: &str, salt: &[u8]) -> BigUint {
    let identity = sha256(&[email.to_ascii_lowercase().as_bytes(), b":", password.as_bytes()]);
    hash_to_int(&[salt, &identity])
}

/// Computes the stored verifier `v = g^x mod N` for account seeding.
pub fn verifier_for(email: &str, password: &str, salt: &[u8]) -> Vec<u8> {
    let n = group_n();
    let x = private_key(email, password, salt);
    BigUint::from(G).modpow(&x, &n).to_bytes_be()
}

/// The deterministic server ephemeral: `b = H(salt | v)`, `B = k*v + g^b`.
fn server_ephemeral(n: &BigUint, salt: &[u8], v: &BigUint) -> (BigUint, BigUint) {
    let b = hash_to_int(&[salt, &v.to_bytes_be()]);
    let k = multiplier(n);
    let b_pub = (k * v + BigUint::from(G).modpow(&b, n)) % n;
    (b, b_pub)
}

/// Verifies the client proof and, on success, yields the server proof `M2`
/// and the 16-byte session key.
pub fn verify(
    salt: &[u8],
    verifier: &[u8],
    a_pub: &[u8],
    m1: &[u8; 32],
) -> Result<AuthSuccess, AuthError> {
    let n = group_n();
    let a = BigUint::from_bytes_be(a_pub);
    // A ≡ 0 (mod N) would pin S to zero regardless of the password.
    if (&a % &n) == BigUint::default() {
        return Err(AuthError::BadCredentials);
    }
    let v = BigUint::from_bytes_be(verifier);

    let (b, b_pub) = server_ephemeral(&n, salt, &v);
    let u = hash_to_int(&[a_pub, &b_pub.to_bytes_be()]);

    // S = (A * v^u)^b mod N
    let s = (&a * v.modpow(&u, &n) % &n).modpow(&b, &n);
    let session = sha256(&[&s.to_bytes_be()]);

    let expected_m1 = sha256(&[a_pub, &b_pub.to_bytes_be(), &session]);
    if &expected_m1 != m1 {
        return Err(AuthError::BadCredentials);
    }

    let m2 = sha256(&[a_pub, m1, &session]);
    let mut session_key = [0u8; 16];
    session_key.copy_from_slice(&sha256(&[&session, b"session"])[..16]);

    Ok(AuthSuccess { m2, session_key })
}

/// Reference client-side computation, used by tools and tests to produce a
/// valid `(A, M1)` pair for known credentials.
pub mod client {
    use super::*;

    pub struct ClientProof {
        pub a_pub: Vec<u8>,
        pub m1: [u8; 32],
    }

    /// Runs the client half of the exchange with an explicit ephemeral.
    pub fn prove(email: &str, password: &str, salt: &[u8], a_priv: &[u8]) -> ClientProof {
        let n = group_n();
        let x = private_key(email, password, salt);
        let v = BigUint::from(G).modpow(&x, &n);

        let a = BigUint::from_bytes_be(a_priv);
        let a_pub = BigUint::from(G).modpow(&a, &n);
        let a_pub_bytes = a_pub.to_bytes_be();

        let (_, b_pub) = server_ephemeral(&n, salt, &v);
        let u = hash_to_int(&[&a_pub_bytes, &b_pub.to_bytes_be()]);

        // The client knows x, hence b, so it mirrors the server's S.
        let b = hash_to_int(&[salt, &v.to_bytes_be()]);
        let s = (&a_pub * v.modpow(&u, &n) % &n).modpow(&b, &n);
        let session = sha256(&[&s.to_bytes_be()]);

        let m1 = sha256(&[&a_pub_bytes, &b_pub.to_bytes_be(), &session]);
        ClientProof { a_pub: a_pub_bytes, m1 }
    }

    /// The matching server proof, so callers can assert `M2`.
    pub fn expect_m2(a_pub: &[u8], m1: &[u8; 32], email: &str, password: &str, salt: &[u8]) -> [u8; 32] {
        let n = group_n();
        let x = private_key(email, password, salt);
        let v = BigUint::from(G).modpow(&x, &n);
        let (b, b_pub) = server_ephemeral(&n, salt, &v);
        let u = hash_to_int(&[a_pub, &b_pub.to_bytes_be()]);
        let a = BigUint::from_bytes_be(a_pub);
        let s = (&a * v.modpow(&u, &n) % &n).modpow(&b, &n);
        let session = sha256(&[&s.to_bytes_be()]);
        sha256(&[a_pub, m1, &session])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "dorian@exile.example";
    const PASSWORD: &str = "piglet-and-stemdragon";
    const SALT: &[u8] = &[0x5a; 16];

    #[test]
    fn good_credentials_verify() {
        let verifier = verifier_for(EMAIL, PASSWORD, SALT);
        let proof = client::prove(EMAIL, PASSWORD, SALT, &[7u8; 32]);

        let success = verify(SALT, &verifier, &proof.a_pub, &proof.m1).unwrap();
        assert_eq!(
            success.m2,
            client::expect_m2(&proof.a_pub, &proof.m1, EMAIL, PASSWORD, SALT)
        );
        assert_ne!(success.session_key, [0u8; 16]);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let verifier = verifier_for(EMAIL, PASSWORD, SALT);
        let proof = client::prove(EMAIL, "wrong-password", SALT, &[7u8; 32]);
        assert_eq!(
            verify(SALT, &verifier, &proof.a_pub, &proof.m1),
            Err(AuthError::BadCredentials)
        );
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let verifier = verifier_for(EMAIL, PASSWORD, SALT);
        let mut proof = client::prove(EMAIL, PASSWORD, SALT, &[7u8; 32]);
        proof.m1[0] ^= 0xff;
        assert_eq!(
            verify(SALT, &verifier, &proof.a_pub, &proof.m1),
            Err(AuthError::BadCredentials)
        );
    }

    #[test]
    fn zero_public_key_is_rejected() {
        let verifier = verifier_for(EMAIL, PASSWORD, SALT);
        assert_eq!(
            verify(SALT, &verifier, &[0u8; 32], &[0u8; 32]),
            Err(AuthError::BadCredentials)
        );
    }

    #[test]
    fn session_key_is_stable_for_the_same_login() {
        let verifier = verifier_for(EMAIL, PASSWORD, SALT);
        let proof = client::prove(EMAIL, PASSWORD, SALT, &[9u8; 32]);
        let one = verify(SALT, &verifier, &proof.a_pub, &proof.m1).unwrap();
        let two = verify(SALT, &verifier, &proof.a_pub, &proof.m1).unwrap();
        assert_eq!(one.session_key, two.session_key);
    }
}
