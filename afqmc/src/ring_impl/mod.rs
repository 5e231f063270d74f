//! Reduction of two-body energies over a Cholesky tensor distributed across a process ring

pub mod codec;
#[cfg(feature = "mpi")]
mod mpi_transport;
mod reducer;
mod transport;
#[cfg(test)]
mod tests;

#[cfg(feature = "mpi")]
pub use mpi_transport::MpiTransport;
pub use reducer::ChunkRingReducer;
pub use transport::{ChannelTransport, RingMessage, RingTopology, RingTransport, RoundMessage};
