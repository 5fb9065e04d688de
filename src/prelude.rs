pub use crate::capture_session::*;
pub use crate::controller::*;
pub use crate::encoder::{EncoderConfig, VideoCodec, ContainerFormat, VideoSource};
pub use crate::frame::*;
pub use crate::grant::*;
pub use crate::mirror::*;
pub use crate::platform::*;
pub use crate::recording_session::*;
pub use crate::session::{Completion, SessionError, TeardownError, TeardownStep};
pub use crate::util::*;

#[cfg(feature = "diagnostic")]
pub use crate::feature::diagnostic::*;
