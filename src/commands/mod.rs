//! CLI commands implementation

pub mod documents;
pub mod facts;
pub mod ingest;
pub mod init;
pub mod status;

pub use documents::*;
pub use facts::*;
pub use ingest::*;
pub use init::*;
pub use status::*;
