//! The four stages of the pipeline.
//!
//! None of the nodes knows about the others; every transfer is a [`DataPacket`] handed
//! out by one node and absorbed by another, and the order of those hand-offs is owned by
//! [`crate::sim::Simulation`].
//!
//! [`DataPacket`]: crate::types::DataPacket

mod daq;
mod enstore;
mod grid;
mod tape;

pub use daq::IngestSource;
pub use enstore::BufferStore;
pub use grid::ProcessingFarm;
pub use tape::ArchiveBacklog;
