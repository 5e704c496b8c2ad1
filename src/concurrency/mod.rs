//! Named concurrency gates (§4.C) and the per-type serializer (§4.D).

pub mod gate;
pub mod type_lock;

pub use gate::ConcurrencyGate;
pub use type_lock::PerTypeSerializer;
