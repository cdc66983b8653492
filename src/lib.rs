//! Threshold signing orchestration for a cluster of vertex nodes
//!
//! Each vertex holds one share of every distributed key. This crate drives
//! the cluster-wide operations without ever holding a private key:
//!
//! - room creation on the leader (node 0)
//! - distributed keygen and public key derivation
//! - fan-out signing with unanimous signature agreement
//! - policy binding and encrypted secret share import
//! - venue session logon signed by the cluster
//!
//! Every multi-node step is all-or-nothing: a single failed node fails the
//! step, and nodes that already applied the change are not reverted.
//!
//! # Usage
//!
//! ```bash
//! vertex-orchestrator keygen
//! vertex-orchestrator sign --key-name <uuid> --message hello
//! vertex-orchestrator ws-trade
//! ```

pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod keygen;
pub mod logging;
pub mod policy;
pub mod prompt;
pub mod room;
pub mod secret_import;
pub mod session;
pub mod signing;
pub mod types;
pub mod venue;

pub use client::VertexClient;
pub use config::{AppConfig, Cluster, ConfigError, VenueConfig, Vertex};
pub use encoding::encode_public_key_pem;
pub use error::{OrchestratorError, Result, VertexError};
pub use keygen::KeyGenerator;
pub use policy::PolicyBinder;
pub use prompt::{OperatorPrompt, TerminalPrompt};
pub use room::RoomCoordinator;
pub use secret_import::{CommandSharer, SecretImporter, SecretSharer};
pub use session::{SessionAuthenticator, SessionState, VenueSession};
pub use signing::{PayloadSigner, SigningOrchestrator};
pub use types::{KeyName, PublicKey, RoomId, Scheme, Signature};
pub use venue::{OrderRequest, OrderType, RestVenue, Side};
