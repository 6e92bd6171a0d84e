//! Audio codec layer - pure functions over byte buffers.
//!
//! No I/O, no async. `codec` holds the G.711 mu-law <-> PCM16LE
//! conversion, the zero-order-hold upsampler, and the WAV header writer.

pub mod codec;

pub use codec::{mulaw_decode, mulaw_encode, upsample_8k_to_16k, wrap_wav, CodecError};
