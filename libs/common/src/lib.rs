pub mod broker;
pub mod id;
pub mod memory;
pub mod notification;
pub mod redis_broker;

pub use broker::{BrokerError, MessageQueue, PubSub, Subscription};
pub use id::PrefixedId;
pub use memory::MemoryBroker;
pub use notification::{Notification, NotificationRequest, PushFrame, ValidationError};
pub use redis_broker::RedisBroker;
