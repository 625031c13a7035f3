pub mod connection;
pub mod ledger;
pub mod protocol;
pub mod relay;
pub mod room;
pub mod store;
mod coordinator;

pub use connection::{ConnectionId, Role};
pub use coordinator::SessionCoordinator;
pub use ledger::{LedgerSnapshot, ParticipantRecord, SessionLedger};
pub use protocol::{ClientMessage, Outbound, ServerMessage};
pub use room::RoomState;
pub use store::RoomStore;
