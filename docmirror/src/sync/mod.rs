pub mod backoff;
pub mod convert;
pub mod engine;
pub mod paths;
pub mod remote;
pub mod resolver;

pub use convert::{ConvertError, Converter};
pub use engine::{ScanRequest, SyncEngine, SyncStats};
pub use remote::DriveRemote;
pub use resolver::{ROOT_FOLDER_ID, ResolveError, resolve_folder_path};
