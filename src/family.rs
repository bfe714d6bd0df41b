//! Register level drivers of the supported MCU families

pub mod stm32f3;
