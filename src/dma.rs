//! # DMA descriptors
//!
//! A [`DmaDescriptor`] binds one direction of a peripheral's data movement to a
//! DMA channel. It is part of the instance's [`Descriptor`](crate::instance::Descriptor),
//! programmed once when the instance is opened and reused for every transfer.

use crate::instance::IrqBinding;

/// DMA transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// From memory to peripheral
    MemoryToPeripheral,
    /// From peripheral to memory
    PeripheralToMemory,
    /// From memory to memory
    MemoryToMemory,
}

/// DMA address increment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Increment {
    /// Enable increment
    Enable,
    /// Disable increment
    Disable,
}

/// Data width of one DMA beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alignment {
    /// 8 bit
    Byte,
    /// 16 bit
    HalfWord,
    /// 32 bit
    Word,
}

/// Burst configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Burst {
    /// One beat per request
    Single,
    /// Incremental burst of 4 beats
    Incr4,
    /// Incremental burst of 8 beats
    Incr8,
    /// Incremental burst of 16 beats
    Incr16,
}

/// Channel priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Very high
    VeryHigh,
}

/// DMA descriptor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The direction does not fit the descriptor's use
    Direction,
    /// The controller or channel does not exist on this family
    Channel,
    /// The family cannot do the requested burst or width
    Unsupported,
}

/// Binding of a peripheral data stream to a DMA channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaDescriptor {
    /// DMA controller number, starting at 1
    pub controller: u8,
    /// Channel (or stream) number, starting at 1
    pub channel: u8,
    /// Transfer direction
    pub direction: Direction,
    /// Memory address increment
    pub memory_increment: Increment,
    /// Peripheral address increment
    pub peripheral_increment: Increment,
    /// Memory side data width
    pub memory_alignment: Alignment,
    /// Peripheral side data width
    pub peripheral_alignment: Alignment,
    /// Burst mode
    pub burst: Burst,
    /// Arbitration priority
    pub priority: Priority,
    /// Transfer complete interrupt of the channel
    pub irq: Option<IrqBinding>,
}

impl DmaDescriptor {
    /// Byte wide, memory incrementing transmit channel
    pub const fn tx(controller: u8, channel: u8) -> Self {
        Self {
            controller,
            channel,
            direction: Direction::MemoryToPeripheral,
            memory_increment: Increment::Enable,
            peripheral_increment: Increment::Disable,
            memory_alignment: Alignment::Byte,
            peripheral_alignment: Alignment::Byte,
            burst: Burst::Single,
            priority: Priority::Medium,
            irq: None,
        }
    }

    /// Byte wide, memory incrementing receive channel
    pub const fn rx(controller: u8, channel: u8) -> Self {
        Self {
            direction: Direction::PeripheralToMemory,
            ..Self::tx(controller, channel)
        }
    }

    /// Set the arbitration priority
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set both data widths
    pub const fn alignment(mut self, alignment: Alignment) -> Self {
        self.memory_alignment = alignment;
        self.peripheral_alignment = alignment;
        self
    }

    /// Set the burst mode
    pub const fn burst(mut self, burst: Burst) -> Self {
        self.burst = burst;
        self
    }

    /// Bind the channel's interrupt
    pub const fn irq(mut self, number: u16, priority: u8) -> Self {
        self.irq = Some(IrqBinding { number, priority });
        self
    }

    /// Check the descriptor is usable in the direction `expected`.
    ///
    /// Peripheral bindings never accept memory-to-memory transfers.
    pub fn validate(&self, expected: Direction) -> Result<(), Error> {
        if self.direction != expected || expected == Direction::MemoryToMemory {
            return Err(Error::Direction);
        }
        if self.controller == 0 || self.channel == 0 {
            return Err(Error::Channel);
        }
        Ok(())
    }
}
