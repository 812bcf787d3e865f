#![cfg_attr(doc, doc = include_str!("../README.md"))]
#![allow(clippy::cast_possible_truncation)]

#[macro_use]
extern crate tracing;

mod intercept;
mod relay;

pub use self::intercept::{Direction, DvcInterceptor, InterceptResult, InterceptionEntry};
pub use self::relay::ProxyRelay;
