pub mod headless;
pub mod loader;
pub mod traits;
pub mod wake_lock;

pub use headless::{HeadlessEngineFactory, HeadlessSurface, NoWakeLock};
pub use loader::{
    BackendLoader, LoadStats, LoadedPayload, LoaderCallbacks, LoaderError, LoaderRequest,
    LoaderResponse, MediaLoader, RequestClass,
};
pub use traits::{EngineErrorKind, EngineEvent, EngineFactory, RenderSurface, StreamingEngine};
pub use wake_lock::{WakeLockHandle, WakeLockManager, WakeLockPlatform};
