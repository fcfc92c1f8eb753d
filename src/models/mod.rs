pub mod descriptor;
pub mod record;

pub use descriptor::FileDescriptor;
pub use record::{FailureStage, MIB, TransferRecord, TransferStatus};
