//! Audio subsystem module

pub mod buffer;
pub mod pump;

#[cfg(feature = "device")]
pub mod device;
#[cfg(feature = "device")]
pub mod stream;

pub use buffer::{create_shared_queue, CaptureQueue, SharedCaptureQueue};
pub use pump::ChunkPump;

#[cfg(feature = "device")]
pub use device::{list_devices, AudioDevice, AudioDeviceInfo};
#[cfg(feature = "device")]
pub use stream::IntercomStream;
