pub mod session;
pub mod topology;
pub mod registry;

pub use registry::ClusterMetadata;
pub use session::{MetadataSession, SessionError, Transaction};
pub use topology::fetch_topology;
