//! concrete HTTP collaborators
//!
//! thin reqwest adapters behind the `client` feature: a JSON-RPC event
//! source, the association-set provider API and the relayer API. the
//! engine itself only ever sees the abstract traits/types these produce.

pub mod asp;
pub mod relayer;
pub mod rpc;

pub use asp::{AspClient, MtLeavesResponse, MtRootsResponse, PoolInfoResponse};
pub use relayer::{FeeQuote, RelayPayload, RelayRequestBody, RelayResponse, RelayerClient, RelayerFees};
pub use rpc::RpcEventSource;
