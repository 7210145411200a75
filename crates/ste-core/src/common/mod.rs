//! Types shared by the coordinator, execution engine and control plane.

mod ids;
mod order;
mod status;

pub use ids::{JobId, PartNumber};
pub use order::{BlobTransferAttributes, CopyJobPartOrder, CopyTransfer};
pub use status::{ChunkStatus, Location, LogLevel, Priority, TransferStatus};
