pub mod alert;
pub mod notification;
pub mod sector;
pub mod sector_strategy;
pub mod symbol;

pub use alert::{Alert, AlertKind, AlertStatus, ChannelFlags};
pub use notification::{NewNotification, Notification, NotificationChannel};
pub use sector::{Sector, SectorStock};
pub use sector_strategy::SectorStrategy;
pub use symbol::{market_index_symbols, Symbol, SymbolError};
