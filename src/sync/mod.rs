//! Counter synchronization core
//!
//! Two channels feed every subscriber: the service's push stream
//! ([`PushChannel`]) and the in-process [`EchoBus`], which carries the
//! re-read that follows each of this client's own mutations. There is no
//! ordering between them; consumers treat every snapshot as a full
//! replacement.

pub mod bus;
pub mod facade;
pub mod gateway;
pub mod protocol;
pub mod push;

pub use bus::{EchoBus, ListenerId, LOCAL_UPDATE_EVENT};
pub use facade::{CounterSync, Subscription, SubscriptionId};
pub use gateway::RemoteGateway;
pub use protocol::{PushMessage, UPDATE_EVENT};
pub use push::PushChannel;
