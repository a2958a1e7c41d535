pub mod claims;
pub mod cron;
pub mod scheduler;

pub use claims::{truncate_to_minute, ClaimStore, ClaimStoreError, ClaimStoreHandle, ExecutionClaim, ScheduledMinute};
pub use cron::{next_run_time, CronError, CronExpr};
pub use scheduler::{
    HttpRunDispatcher, HttpScheduleSource, RunDispatcher, Schedule, ScheduleSource, Scheduler, SchedulerError,
    TickReport, CLAIM_RETENTION_MINUTES,
};
