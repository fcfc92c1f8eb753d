pub mod queue;
pub mod sftp;
pub mod storage;
