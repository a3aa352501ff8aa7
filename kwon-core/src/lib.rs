//! Tamper-evident transaction audit pipeline: hashing/Merkle primitives
//! (C1), the relational audit store (C2), the incremental ingestor (C3),
//! the batcher/anchorer (C4), and the proof-pack builder (C5).

pub mod batch;
pub mod hashing;
pub mod ingest;
pub mod proofpack;
pub mod store;

pub use batch::{anchor_batch, anchor_status, make_batch, run_batch_cycle, BatchConfig, BatchMode, BatchOutcome, DEFAULT_CHAIN};
pub use hashing::{details_hash, normalize_hex, verify_proof, LeafFields, MerkleTree};
pub use ingest::{ingest_cycle, IngestConfig, IngestReport, SAFE_LAG};
pub use proofpack::{build_search_pack, build_single_event_pack, AddressRole, PackSearchFilter, ProofPackEntry, ProofPackMeta};
pub use store::{AuditStore, SelectOrder};
