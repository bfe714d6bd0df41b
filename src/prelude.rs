//! Prelude

pub use crate::hal::prelude::*;
pub use crate::status::StatusCode as _omni_hal_status_StatusCode;
pub use crate::time::duration::Extensions as _omni_hal_time_duration_Extensions;
pub use crate::time::rate::Extensions as _omni_hal_time_rate_Extensions;
pub use crate::{
    hal::digital::v2::InputPin as _embedded_hal_digital_InputPin,
    hal::digital::v2::OutputPin as _embedded_hal_digital_OutputPin,
    hal::digital::v2::StatefulOutputPin as _embedded_hal_digital_StatefulOutputPin,
    hal::digital::v2::ToggleableOutputPin as _embedded_hal_digital_ToggleableOutputPin,
};
