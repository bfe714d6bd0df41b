//! Command console on a serial port
//!
//! Bytes read from the port are echoed and collected into a line. Carriage
//! return or line feed runs the line: the first word names a [`Command`], the
//! whole line split at whitespace is handed to it as arguments. `help` lists
//! the commands. Backspace and DEL erase the last character, other control
//! characters are dropped.
//!
//! The console works with anything implementing the `embedded-hal` serial
//! traits, in particular `&'static Serial<D>`.
//!
//! ```ignore
//! fn led(args: &[&str], out: &mut dyn core::fmt::Write) -> core::fmt::Result {
//!     writeln!(out, "led {}", args.get(1).copied().unwrap_or("?"))
//! }
//!
//! static COMMANDS: [Command; 1] = [Command::new("led", "led on|off", led)];
//!
//! let mut console: Console<_> = Console::new(&USART2, &COMMANDS);
//! console.open(Config::default())?;
//! console.start()?;
//! ```

use core::convert::Infallible;
use core::fmt::{self, Write as _};

use embedded_hal::serial;
use heapless::Vec;

use crate::event::Callback;
use crate::status::{self, StatusCode};

/// Words of one command line, the command name included
pub const MAX_ARGS: usize = 8;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

/// Runs one command. `args[0]` is the command name.
pub type Handler = fn(args: &[&str], out: &mut dyn fmt::Write) -> fmt::Result;

/// A console command
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    /// One line shown by `help`
    pub help: &'static str,
    pub run: Handler,
}

impl Command {
    pub const fn new(name: &'static str, help: &'static str, run: Handler) -> Self {
        Self { name, help, run }
    }
}

bitflags::bitflags! {
    /// Console events
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Event: u32 {
        /// The console printed its first prompt
        const INITIALIZED = 1 << 0;
    }
}

/// Console error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The console has not been opened
    NotOpen,
    /// The console is open already
    AlreadyOpen,
    /// The serial port reported a receive error
    Read,
    /// Output could not be written
    Write,
}

impl StatusCode for Error {
    fn code(&self) -> i32 {
        status::FAIL
    }
}

/// Console settings
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Printed before every line
    pub prompt: &'static str,
    /// Send received characters back
    pub echo: bool,
    /// Told about [`Event::INITIALIZED`]
    pub callback: Option<Callback<Event>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: "> ",
            echo: true,
            callback: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Opened
    pub initialized: bool,
}

/// Sticky errors, cleared by the next open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStatus {
    /// A line ran past the buffer, the excess was dropped
    pub overflow: bool,
    /// The port reported a receive error
    pub read: bool,
    /// Writing to the port failed
    pub write: bool,
}

/// Formatting onto a serial port, with `\n` sent as `\r\n`
struct Output<'s, S>(&'s mut S);

impl<S: serial::Write<u8>> Output<'_, S> {
    fn put(&mut self, byte: u8) -> fmt::Result {
        nb::block!(self.0.write(byte)).map_err(|_| fmt::Error)
    }
}

impl<S: serial::Write<u8>> fmt::Write for Output<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.put(b'\r')?;
            }
            self.put(byte)?;
        }
        Ok(())
    }
}

/// A console keeping lines of up to `N` characters
pub struct Console<S, const N: usize = 64> {
    serial: S,
    commands: &'static [Command],
    line: Vec<u8, N>,
    config: Config,
    previous: u8,
    status: Status,
    error: ErrorStatus,
}

impl<S, const N: usize> Console<S, N>
where
    S: serial::Read<u8> + serial::Write<u8>,
{
    /// A closed console on `serial`
    pub fn new(serial: S, commands: &'static [Command]) -> Self {
        Self {
            serial,
            commands,
            line: Vec::new(),
            config: Config::default(),
            previous: 0,
            status: Status::default(),
            error: ErrorStatus::default(),
        }
    }

    /// Give the port back
    pub fn free(self) -> S {
        self.serial
    }

    /// Print the first prompt and report [`Event::INITIALIZED`].
    pub fn open(&mut self, config: Config) -> Result<(), Error> {
        if self.status.initialized {
            return Err(Error::AlreadyOpen);
        }
        self.config = config;
        self.line.clear();
        self.previous = 0;
        self.error = ErrorStatus::default();
        self.print(config.prompt)?;
        self.status.initialized = true;
        debug!("console: open");
        if let Some(callback) = config.callback {
            callback(Event::INITIALIZED);
        }
        Ok(())
    }

    /// Drop the pending line
    pub fn close(&mut self) {
        self.line.clear();
        self.status = Status::default();
    }

    /// Serve the console forever.
    ///
    /// Port errors do not end the loop, they show up in [`Console::error`].
    pub fn start(&mut self) -> Result<Infallible, Error> {
        if !self.status.initialized {
            return Err(Error::NotOpen);
        }
        loop {
            let _ = self.poll();
        }
    }

    /// Handle every byte the port has ready, then return.
    pub fn poll(&mut self) -> Result<(), Error> {
        if !self.status.initialized {
            return Err(Error::NotOpen);
        }
        loop {
            match self.serial.read() {
                Ok(byte) => self.feed(byte)?,
                Err(nb::Error::WouldBlock) => return Ok(()),
                Err(nb::Error::Other(_)) => {
                    self.error.read = true;
                    warn!("console: receive error");
                    return Err(Error::Read);
                }
            }
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Errors seen since the last open
    pub fn error(&self) -> ErrorStatus {
        self.error
    }

    /// Characters of the line typed so far
    pub fn pending(&self) -> &[u8] {
        &self.line
    }

    fn feed(&mut self, byte: u8) -> Result<(), Error> {
        let previous = core::mem::replace(&mut self.previous, byte);
        match byte {
            // the second half of a CR LF pair
            b'\n' if previous == b'\r' => Ok(()),
            b'\r' | b'\n' => self.execute(),
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() && self.config.echo {
                    self.print("\x08 \x08")?;
                }
                Ok(())
            }
            0x20..=0x7E => {
                if self.line.push(byte).is_err() {
                    self.error.overflow = true;
                    return Ok(());
                }
                if self.config.echo {
                    let echoed = Output(&mut self.serial).put(byte);
                    echoed.map_err(|_| self.write_failed())?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn execute(&mut self) -> Result<(), Error> {
        // only printable ASCII is ever pushed
        let line = core::str::from_utf8(&self.line).unwrap_or_default();
        let mut out = Output(&mut self.serial);
        let result = respond(&mut out, line, self.commands, self.config.prompt);
        self.line.clear();
        result.map_err(|_| self.write_failed())
    }

    fn print(&mut self, s: &str) -> Result<(), Error> {
        let written = Output(&mut self.serial).write_str(s);
        written.map_err(|_| self.write_failed())
    }

    fn write_failed(&mut self) -> Error {
        self.error.write = true;
        Error::Write
    }
}

/// Output written outside a command, e.g. log lines
impl<S, const N: usize> fmt::Write for Console<S, N>
where
    S: serial::Read<u8> + serial::Write<u8>,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Output(&mut self.serial).write_str(s)
    }
}

fn respond<S: serial::Write<u8>>(
    out: &mut Output<'_, S>,
    line: &str,
    commands: &[Command],
    prompt: &str,
) -> fmt::Result {
    out.write_str("\n")?;
    run(line, commands, out)?;
    out.write_str(prompt)
}

fn run<S: serial::Write<u8>>(
    line: &str,
    commands: &[Command],
    out: &mut Output<'_, S>,
) -> fmt::Result {
    let mut args: Vec<&str, MAX_ARGS> = Vec::new();
    for word in line.split_whitespace() {
        if args.push(word).is_err() {
            return writeln!(out, "too many arguments");
        }
    }
    let Some(&name) = args.first() else {
        return Ok(());
    };
    if name == "help" {
        for command in commands {
            writeln!(out, "{:<12}{}", command.name, command.help)?;
        }
        return Ok(());
    }
    match commands.iter().find(|command| command.name == name) {
        Some(command) => (command.run)(&args, out),
        None => writeln!(out, "unknown command: {}", name),
    }
}
