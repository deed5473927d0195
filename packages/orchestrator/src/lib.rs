//! Hilo Orchestrator: the off-chain half of the Hilo ⇄ Ethereum bridge
//!
//! Each orchestrator runs next to a validator and:
//!
//! - watches the Gravity contract and votes on its events in nonce order
//! - rebuilds pending batches from its own view of the pool and signs them
//! - relays batches that reached signature quorum to Ethereum
//! - deploys ERC20s for Hilo denoms on first use
//!
//! All chain access goes through the [`cosmos::CosmosAdapter`] and
//! [`ethereum::EthereumAdapter`] traits. [`devnet::Devnet`] wires several
//! orchestrators to an in-process Hilo chain and a simulated contract.

pub mod api;
pub mod config;
pub mod cosmos;
pub mod devnet;
pub mod error;
pub mod ethereum;
pub mod metrics;
pub mod orchestrator;
pub mod relayer;
pub mod retry;
pub mod signer;
pub mod watchers;

pub use error::AdapterError;
pub use orchestrator::{Orchestrator, OrchestratorStats, TickReport};
pub use signer::OrchestratorKey;
