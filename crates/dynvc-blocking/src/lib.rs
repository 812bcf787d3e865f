#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

mod connection;
mod event;
mod framed;

pub use self::connection::{Connection, ConnectionHandle};
pub use self::event::StopEvent;
pub use self::framed::{Framed, FramedReader, FramedTransport, FramedWriter};
