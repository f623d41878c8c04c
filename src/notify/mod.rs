pub mod bus;
pub mod notifier;

pub use bus::{BroadcastBus, NotificationBus};
pub use notifier::ChangeNotifier;
