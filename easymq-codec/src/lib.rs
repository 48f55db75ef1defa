//! Data structures and converter functions for dealing with EasyMQ wire
//! frames.
//!
//! All the data types are in the `frame` module, the `codec` implements
//! the encoding and the decoding.
pub mod codec;
pub mod frame;


#[macro_use]
extern crate bitflags;
