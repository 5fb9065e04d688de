#[cfg(feature = "diagnostic")]
pub mod diagnostic;
