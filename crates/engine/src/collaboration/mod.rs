//! Revision exchange between models editing the same workbook.

pub mod message;
pub mod session;
pub mod transport;

pub use message::{ClientLeft, CollaborationMessage, RemoteRevision};
pub use session::{Session, SessionUpdate};
pub use transport::{Delivery, LocalTransport, MessageCallback, TransportService};
