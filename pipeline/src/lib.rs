//! Block pipeline — assembly, attestation, and publication.
//!
//! The validator side ([`BlockProducer`]) accumulates submissions into one
//! pending block, batches on a debounce timer, and drives the two-round
//! attestation protocol. The attestor side ([`AttestorEngine`]) answers
//! `v_attestBlock` / `v_attestSignatures` for peer validators. Finalized
//! blocks fan out through the [`Publisher`] and land on the local
//! [`DeliveryQueue`] for polling consumers.

pub mod api_token;
pub mod attest;
pub mod attestor;
pub mod config;
pub mod error;
pub mod mempool;
pub mod publisher;
pub mod queue;
pub mod reads;
pub mod validation;
pub mod validator;

pub use api_token::{token_bound_to, ApiTokenIssuer};
pub use attest::{apply_patch, block_validator, self_validate, verify_patch_signature};
pub use attestor::{AttestorEngine, BlockCache};
pub use config::PipelineConfig;
pub use error::{BlockError, PipelineError, TransactionError};
pub use mempool::Mempool;
pub use publisher::{NodeSendResult, Publisher, SendOutcome};
pub use queue::{DeliveryQueue, QueueEntry};
pub use reads::QuorumReader;
pub use validation::validate_structure;
pub use validator::{BlockProducer, CycleEvent};
