//! `sensor_models` — LD2450 radar observations, frame codec, stream resync
//! and mounting geometry.

pub mod frame;
pub mod observation;
pub mod radar;
pub mod stream;

pub use frame::{decode_frame, decode_hex_payload, encode_frame, FrameError, FRAME_LEN};
pub use observation::{Observation, Slot, SLOT_COUNT};
pub use radar::SensorMount;
pub use stream::FrameAssembler;
