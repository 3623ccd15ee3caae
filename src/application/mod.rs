pub mod admission;
pub mod broadcast;
pub mod monitoring;
pub mod scheduler;

pub use admission::{
    AdmissionDenied, ConnectionGuard, ConnectionLimits, ConnectionTracker, MessageRateLimiter,
    RateLimit,
};
pub use broadcast::{Broadcaster, Frame, SubscriberId, Subscription};
pub use monitoring::MonitoringService;
pub use scheduler::{ScheduledTask, Scheduler};
