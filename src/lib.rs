//! Display projection for hosts that need a one-time user grant to mirror the
//! screen: single still captures, or continuous recording into a surface-fed
//! video encoder.
//!
//! Start from [`controller::ProjectionController`] and a host implementation of
//! [`platform::Platform`].

pub mod platform;
pub mod feature;

pub mod util;
pub mod grant;
pub mod frame;
pub mod mirror;
pub mod encoder;
pub mod session;
pub mod capture_session;
pub mod recording_session;
pub mod controller;

pub mod prelude;
