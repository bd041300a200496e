pub mod catalog;
pub mod notifications;
pub mod providers;
pub mod subject;
pub mod tracking;

pub use catalog::Catalog;
pub use notifications::{Notification, NotificationKind, Notifier};
pub use subject::{Subject, Subscription};
pub use tracking::{StoreRegistry, TrackingBackend, TrackingStore};
