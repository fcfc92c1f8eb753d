pub mod estimator;
pub mod file_handler;
pub mod metrics;
pub mod queue;
pub mod remote;
pub mod storage;
pub mod worker;
