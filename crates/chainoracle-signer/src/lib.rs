//! chainoracle-signer — threshold key material and signature aggregation.
//!
//! - [`threshold`] — dealer, key shares, partial signing/verification and
//!   Lagrange combination over secp256k1
//! - [`aggregator`] — [`MultiSignatureAggregator`], one session per
//!   `(chain, request, epoch)`

pub mod aggregator;
pub mod threshold;

pub use aggregator::{MultiSignatureAggregator, SubmitOutcome};
pub use threshold::{deal, hash_to_point, DealtKeys, KeyShare, PublicKeySet, SignerError};
