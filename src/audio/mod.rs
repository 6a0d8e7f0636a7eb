//! Audio acquisition, mixing, quality scoring, and container encoding.

pub mod mixer;
pub mod quality;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub mod capture;
