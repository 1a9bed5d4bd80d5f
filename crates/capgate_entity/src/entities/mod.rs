pub mod capability;
pub mod channel;
pub mod channel_account;
pub mod channel_capability;
pub mod channel_request_log;
pub mod job_queue;
pub mod task;
pub mod token;
pub mod token_channel_priority;
pub mod user;
