//! Threshold signatures over secp256k1.
//!
//! A trusted dealer splits a group secret with a degree `T-1` polynomial and
//! hands signer `i` the share `x_i = f(i)` (indices are 1-based). For a
//! payload hash `m` every signer publishes `σ_i = x_i·H(m)` together with a
//! Chaum–Pedersen proof that `σ_i` and its public share `X_i = x_i·G` share
//! the same discrete log. Any `T` valid partials interpolate to the same
//! group signature `σ = f(0)·H(m)`.
//!
//! Partial signature wire format: `σ_i (33, compressed) ‖ c (32) ‖ z (32)`.

use std::collections::BTreeMap;
use std::fmt;

use chainoracle_core::OracleError;
use chainoracle_core::PartialSignature;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const HASH_TO_CURVE_DST: &[u8] = b"CHAINORACLE-H2C-SHA256-V1";
const CHALLENGE_DST: &[u8] = b"CHAINORACLE-DLEQ-V1";
const NONCE_DST: &[u8] = b"CHAINORACLE-NONCE-V1";

const POINT_LEN: usize = 33;
const SCALAR_LEN: usize = 32;

/// Byte length of an encoded partial signature.
pub const PARTIAL_SIGNATURE_LEN: usize = POINT_LEN + 2 * SCALAR_LEN;

/// Byte length of a combined group signature.
pub const GROUP_SIGNATURE_LEN: usize = POINT_LEN;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid threshold parameters: {0}")]
    InvalidParameters(String),

    #[error("unknown signer index {0}")]
    UnknownSigner(u32),

    #[error("malformed partial signature: {0}")]
    MalformedSignature(String),

    #[error("proof check failed for signer {0}")]
    InvalidProof(u32),

    #[error("not enough partial signatures: have {have}, need {need}")]
    NotEnoughShares { have: usize, need: u32 },

    #[error("could not map payload hash onto the curve")]
    HashToCurve,

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<SignerError> for OracleError {
    fn from(e: SignerError) -> Self {
        OracleError::Other(e.to_string())
    }
}

// ─── Encoding helpers ─────────────────────────────────────────────────────────

fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    AffinePoint::from(*point)
        .to_encoded_point(true)
        .as_bytes()
        .to_vec()
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, SignerError> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| SignerError::Encoding(format!("bad SEC1 point: {e}")))?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    let point = ProjectivePoint::from(affine.ok_or_else(|| SignerError::Encoding("point not on curve".into()))?);
    if point == ProjectivePoint::IDENTITY {
        return Err(SignerError::Encoding("identity point".into()));
    }
    Ok(point)
}

fn decode_scalar(bytes: &[u8]) -> Result<Scalar, SignerError> {
    if bytes.len() != SCALAR_LEN {
        return Err(SignerError::Encoding(format!("scalar must be {SCALAR_LEN} bytes")));
    }
    let scalar: Option<Scalar> = Scalar::from_repr(FieldBytes::clone_from_slice(bytes)).into();
    scalar.ok_or_else(|| SignerError::Encoding("scalar out of range".into()))
}

fn point_from_hex(s: &str) -> Result<ProjectivePoint, SignerError> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| SignerError::Encoding(e.to_string()))?;
    decode_point(&bytes)
}

fn scalar_from_digest(digest: &[u8]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(digest))
}

/// Map a payload hash to a curve point with unknown discrete log
/// (try-and-increment over compressed x-coordinates).
pub fn hash_to_point(payload_hash: &[u8; 32]) -> Result<ProjectivePoint, SignerError> {
    for counter in 0u32..256 {
        let digest = Sha256::new()
            .chain_update(HASH_TO_CURVE_DST)
            .chain_update(payload_hash)
            .chain_update(counter.to_be_bytes())
            .finalize();
        let mut candidate = [0u8; POINT_LEN];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&digest);
        if let Ok(point) = decode_point(&candidate) {
            return Ok(point);
        }
    }
    Err(SignerError::HashToCurve)
}

fn challenge(
    public_share: &ProjectivePoint,
    message_point: &ProjectivePoint,
    sigma: &ProjectivePoint,
    a: &ProjectivePoint,
    b: &ProjectivePoint,
) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DST);
    for point in [public_share, message_point, sigma, a, b] {
        hasher.update(encode_point(point));
    }
    scalar_from_digest(&hasher.finalize())
}

// ─── KeyShare ─────────────────────────────────────────────────────────────────

/// One signer's secret share. Serialises as `{ "index", "secret" }` with a
/// hex scalar.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "KeyShareRepr", into = "KeyShareRepr")]
pub struct KeyShare {
    index: u32,
    secret: Scalar,
}

#[derive(Serialize, Deserialize)]
struct KeyShareRepr {
    index: u32,
    secret: String,
}

impl TryFrom<KeyShareRepr> for KeyShare {
    type Error = SignerError;

    fn try_from(repr: KeyShareRepr) -> Result<Self, Self::Error> {
        if repr.index == 0 {
            return Err(SignerError::InvalidParameters("signer index must be >= 1".into()));
        }
        let bytes = hex::decode(repr.secret.trim_start_matches("0x"))
            .map_err(|e| SignerError::Encoding(e.to_string()))?;
        Ok(Self {
            index: repr.index,
            secret: decode_scalar(&bytes)?,
        })
    }
}

impl From<KeyShare> for KeyShareRepr {
    fn from(share: KeyShare) -> Self {
        Self {
            index: share.index,
            secret: hex::encode(share.secret.to_bytes()),
        }
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl KeyShare {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn public_share(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * self.secret
    }

    /// Partial signature bytes over `payload_hash`. Deterministic.
    pub fn sign(&self, payload_hash: &[u8; 32]) -> Result<Vec<u8>, SignerError> {
        let h = hash_to_point(payload_hash)?;
        let sigma = h * self.secret;
        let public_share = self.public_share();

        let nonce_digest = Sha256::new()
            .chain_update(NONCE_DST)
            .chain_update(self.secret.to_bytes())
            .chain_update(payload_hash)
            .finalize();
        let k = scalar_from_digest(&nonce_digest);

        let a = ProjectivePoint::GENERATOR * k;
        let b = h * k;
        let c = challenge(&public_share, &h, &sigma, &a, &b);
        let z = k + c * self.secret;

        let mut out = Vec::with_capacity(PARTIAL_SIGNATURE_LEN);
        out.extend_from_slice(&encode_point(&sigma));
        out.extend_from_slice(&c.to_bytes());
        out.extend_from_slice(&z.to_bytes());
        Ok(out)
    }

    /// Sign and wrap into the message peers exchange.
    pub fn partial(&self, payload_hash: [u8; 32]) -> Result<PartialSignature, SignerError> {
        Ok(PartialSignature {
            signer_index: self.index,
            payload_hash,
            signature: self.sign(&payload_hash)?,
        })
    }
}

// ─── PublicKeySet ─────────────────────────────────────────────────────────────

/// Public half of a dealt key set: threshold, group key and every signer's
/// public share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeySetRepr", into = "PublicKeySetRepr")]
pub struct PublicKeySet {
    threshold: u32,
    group_key: ProjectivePoint,
    shares: BTreeMap<u32, ProjectivePoint>,
}

#[derive(Serialize, Deserialize)]
struct PublicKeySetRepr {
    threshold: u32,
    group_key: String,
    shares: BTreeMap<u32, String>,
}

impl TryFrom<PublicKeySetRepr> for PublicKeySet {
    type Error = SignerError;

    fn try_from(repr: PublicKeySetRepr) -> Result<Self, Self::Error> {
        let shares = repr
            .shares
            .iter()
            .map(|(index, point)| Ok((*index, point_from_hex(point)?)))
            .collect::<Result<BTreeMap<_, _>, SignerError>>()?;
        check_parameters(repr.threshold, shares.len() as u32)?;
        if shares.keys().copied().ne(1..=shares.len() as u32) {
            return Err(SignerError::InvalidParameters("share indices must be 1..=N".into()));
        }
        Ok(Self {
            threshold: repr.threshold,
            group_key: point_from_hex(&repr.group_key)?,
            shares,
        })
    }
}

impl From<PublicKeySet> for PublicKeySetRepr {
    fn from(set: PublicKeySet) -> Self {
        Self {
            threshold: set.threshold,
            group_key: hex::encode(encode_point(&set.group_key)),
            shares: set
                .shares
                .iter()
                .map(|(index, point)| (*index, hex::encode(encode_point(point))))
                .collect(),
        }
    }
}

impl PublicKeySet {
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn participants(&self) -> u32 {
        self.shares.len() as u32
    }

    /// Compressed SEC1 group key.
    pub fn group_key_bytes(&self) -> Vec<u8> {
        encode_point(&self.group_key)
    }

    pub fn public_share(&self, index: u32) -> Option<&ProjectivePoint> {
        self.shares.get(&index)
    }

    /// Check a partial signature against signer `index`'s public share and
    /// return its signature point.
    pub fn verify_share(
        &self,
        index: u32,
        payload_hash: &[u8; 32],
        signature: &[u8],
    ) -> Result<ProjectivePoint, SignerError> {
        let public_share = self.shares.get(&index).ok_or(SignerError::UnknownSigner(index))?;
        if signature.len() != PARTIAL_SIGNATURE_LEN {
            return Err(SignerError::MalformedSignature(format!(
                "expected {PARTIAL_SIGNATURE_LEN} bytes, got {}",
                signature.len()
            )));
        }
        let sigma = decode_point(&signature[..POINT_LEN])?;
        let c = decode_scalar(&signature[POINT_LEN..POINT_LEN + SCALAR_LEN])?;
        let z = decode_scalar(&signature[POINT_LEN + SCALAR_LEN..])?;

        let h = hash_to_point(payload_hash)?;
        let a = ProjectivePoint::GENERATOR * z - *public_share * c;
        let b = h * z - sigma * c;
        if challenge(public_share, &h, &sigma, &a, &b) != c {
            return Err(SignerError::InvalidProof(index));
        }
        Ok(sigma)
    }

    /// Interpolate the group signature from the `T` lowest-indexed partials.
    /// Partials are assumed verified.
    pub fn combine<'a, I>(&self, partials: I) -> Result<Vec<u8>, SignerError>
    where
        I: IntoIterator<Item = (u32, &'a [u8])>,
    {
        let by_index: BTreeMap<u32, &[u8]> = partials.into_iter().collect();
        if by_index.len() < self.threshold as usize {
            return Err(SignerError::NotEnoughShares {
                have: by_index.len(),
                need: self.threshold,
            });
        }

        let chosen: Vec<(u32, &[u8])> = by_index.into_iter().take(self.threshold as usize).collect();
        let indices: Vec<u32> = chosen.iter().map(|(i, _)| *i).collect();

        let mut sigma = ProjectivePoint::IDENTITY;
        for (index, bytes) in &chosen {
            if !self.shares.contains_key(index) {
                return Err(SignerError::UnknownSigner(*index));
            }
            if bytes.len() < POINT_LEN {
                return Err(SignerError::MalformedSignature("truncated signature point".into()));
            }
            let point = decode_point(&bytes[..POINT_LEN])?;
            sigma += point * lagrange_at_zero(*index, &indices)?;
        }
        Ok(encode_point(&sigma))
    }
}

/// λ_i(0) = Π_{j≠i} j / (j − i)
fn lagrange_at_zero(index: u32, indices: &[u32]) -> Result<Scalar, SignerError> {
    let xi = Scalar::from(index as u64);
    let mut num = Scalar::ONE;
    let mut den = Scalar::ONE;
    for &j in indices.iter().filter(|&&j| j != index) {
        let xj = Scalar::from(j as u64);
        num *= xj;
        den *= xj - xi;
    }
    let inv: Option<Scalar> = den.invert().into();
    Ok(num * inv.ok_or_else(|| SignerError::InvalidParameters("duplicate signer index".into()))?)
}

fn check_parameters(threshold: u32, participants: u32) -> Result<(), SignerError> {
    if threshold == 0 || threshold > participants {
        return Err(SignerError::InvalidParameters(format!(
            "threshold {threshold} with {participants} participants"
        )));
    }
    Ok(())
}

// ─── Dealer ───────────────────────────────────────────────────────────────────

/// Output of [`deal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealtKeys {
    pub public: PublicKeySet,
    pub shares: Vec<KeyShare>,
}

/// Deal a fresh `threshold`-of-`participants` key set.
pub fn deal<R: RngCore + CryptoRng>(
    threshold: u32,
    participants: u32,
    rng: &mut R,
) -> Result<DealtKeys, SignerError> {
    check_parameters(threshold, participants)?;

    let coefficients: Vec<Scalar> = (0..threshold).map(|_| Scalar::random(&mut *rng)).collect();
    let eval = |x: u32| {
        let x = Scalar::from(x as u64);
        coefficients.iter().rev().fold(Scalar::ZERO, |acc, c| acc * x + c)
    };

    let shares: Vec<KeyShare> = (1..=participants)
        .map(|index| KeyShare {
            index,
            secret: eval(index),
        })
        .collect();
    let public = PublicKeySet {
        threshold,
        group_key: ProjectivePoint::GENERATOR * coefficients[0],
        shares: shares.iter().map(|s| (s.index, s.public_share())).collect(),
    };

    tracing::debug!(threshold, participants, "dealt threshold key set");
    Ok(DealtKeys { public, shares })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn keys(t: u32, n: u32) -> DealtKeys {
        deal(t, n, &mut StdRng::seed_from_u64(7)).unwrap()
    }

    fn combine_subset(keys: &DealtKeys, subset: &[u32], hash: &[u8; 32]) -> Vec<u8> {
        let sigs: Vec<(u32, Vec<u8>)> = subset
            .iter()
            .map(|i| (*i, keys.shares[*i as usize - 1].sign(hash).unwrap()))
            .collect();
        keys.public
            .combine(sigs.iter().map(|(i, s)| (*i, s.as_slice())))
            .unwrap()
    }

    #[test]
    fn partials_verify_against_public_shares() {
        let keys = keys(3, 5);
        let hash = [9u8; 32];
        for share in &keys.shares {
            let sig = share.sign(&hash).unwrap();
            assert_eq!(sig.len(), PARTIAL_SIGNATURE_LEN);
            keys.public.verify_share(share.index(), &hash, &sig).unwrap();
        }
    }

    #[test]
    fn wrong_signer_or_payload_fails() {
        let keys = keys(2, 3);
        let hash = [1u8; 32];
        let sig = keys.shares[0].sign(&hash).unwrap();
        assert!(matches!(
            keys.public.verify_share(2, &hash, &sig),
            Err(SignerError::InvalidProof(2))
        ));
        assert!(keys.public.verify_share(1, &[2u8; 32], &sig).is_err());
        assert!(matches!(
            keys.public.verify_share(9, &hash, &sig),
            Err(SignerError::UnknownSigner(9))
        ));
        assert!(keys.public.verify_share(1, &hash, &sig[..40]).is_err());
    }

    #[test]
    fn any_threshold_subset_gives_same_signature() {
        let keys = keys(3, 5);
        let hash = [42u8; 32];
        let a = combine_subset(&keys, &[1, 3, 4], &hash);
        let b = combine_subset(&keys, &[2, 3, 5], &hash);
        let c = combine_subset(&keys, &[4, 1, 3], &hash);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), GROUP_SIGNATURE_LEN);
        // a different payload gives a different signature
        assert_ne!(a, combine_subset(&keys, &[1, 3, 4], &[43u8; 32]));
    }

    #[test]
    fn combine_needs_threshold() {
        let keys = keys(3, 5);
        let hash = [0u8; 32];
        let sig = keys.shares[0].sign(&hash).unwrap();
        let err = keys.public.combine([(1, sig.as_slice())]).unwrap_err();
        assert!(matches!(err, SignerError::NotEnoughShares { have: 1, need: 3 }));
    }

    #[test]
    fn signing_is_deterministic() {
        let keys = keys(1, 1);
        let hash = [5u8; 32];
        assert_eq!(keys.shares[0].sign(&hash).unwrap(), keys.shares[0].sign(&hash).unwrap());
    }

    #[test]
    fn invalid_parameters_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(deal(0, 3, &mut rng).is_err());
        assert!(deal(4, 3, &mut rng).is_err());
    }

    #[test]
    fn key_material_json_roundtrip() {
        let keys = keys(2, 3);
        let json = serde_json::to_string(&keys).unwrap();
        let back: DealtKeys = serde_json::from_str(&json).unwrap();
        assert_eq!(back.public, keys.public);

        let hash = [3u8; 32];
        let sig = back.shares[1].sign(&hash).unwrap();
        keys.public.verify_share(2, &hash, &sig).unwrap();
        assert!(!format!("{:?}", back.shares[0]).contains(&hex::encode(keys.shares[0].secret.to_bytes())));
    }
}
