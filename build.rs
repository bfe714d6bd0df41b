use std::{env, fs::File, io::prelude::*, path::PathBuf};

fn main() {
    if cfg!(feature = "ld") {
        if !cfg!(feature = "device-selected") {
            eprintln!(
                "The `ld` feature needs a target chip to generate `memory.x`.

Please select one of the following (`x` denotes any character in [a-z]):

    stm32f301x6 stm32f301x8
    stm32f302xb stm32f302xc stm32f302xd stm32f302xe
    stm32f303x6 stm32f303x8 stm32f303xb stm32f303xc stm32f303xd stm32f303xe
    stm32f334x4 stm32f334x6 stm32f334x8

Without a chip feature only the portable driver core is built."
            );
            std::process::exit(1);
        }
        gen_memory_x();
    }
    println!("cargo:rerun-if-changed=build.rs");
}

/// Generate `memory.x` for selected device
///
/// Available RAM/CCMRAM/FLASH value is extracted from RM0316/RM0364/RM0365/RM0366
fn gen_memory_x() {
    enum Mem {
        _4,
        _6,
        _8,
        B,
        C,
        D,
        E,
    }

    let mem = if cfg!(feature = "mem-4") {
        Mem::_4
    } else if cfg!(feature = "mem-6") {
        Mem::_6
    } else if cfg!(feature = "mem-8") {
        Mem::_8
    } else if cfg!(feature = "mem-b") {
        Mem::B
    } else if cfg!(feature = "mem-c") {
        Mem::C
    } else if cfg!(feature = "mem-d") {
        Mem::D
    } else if cfg!(feature = "mem-e") {
        Mem::E
    } else {
        eprintln!("Memory size unknown, check the chip feature selected in Cargo.toml.");
        std::process::exit(1);
    };

    let flash = match mem {
        Mem::_4 => 16,
        Mem::_6 => 32,
        Mem::_8 => 64,
        Mem::B => 128,
        Mem::C => 256,
        Mem::D => 384,
        Mem::E => 512,
    };
    let ccmram = if cfg!(feature = "svd-f303") || cfg!(feature = "svd-f3x4") {
        match mem {
            Mem::_4 | Mem::_6 | Mem::_8 => 4,
            Mem::B | Mem::C => 8,
            Mem::D | Mem::E => 16,
        }
    } else {
        0
    };
    let ram = match mem {
        Mem::_4 | Mem::_6 | Mem::_8 => 16,
        Mem::B if cfg!(feature = "svd-f302") => 32,
        Mem::B if cfg!(feature = "svd-f303") => 40,
        Mem::C if cfg!(feature = "svd-f302") => 40,
        Mem::C if cfg!(feature = "svd-f303") => 48,
        Mem::D | Mem::E if cfg!(feature = "svd-f302") => 64,
        Mem::D | Mem::E if cfg!(feature = "svd-f303") => 80,
        _ => {
            eprintln!("Memory size unknown, check the chip feature selected in Cargo.toml.");
            std::process::exit(1);
        }
    } - ccmram;

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let mut file = File::create(out_dir.join("memory.x")).expect("create memory.x");
    writeln!(file, "MEMORY {{").unwrap();
    writeln!(file, "    FLASH (rx) : o = 0x8000000, l = {}K", flash).unwrap();
    if ccmram > 0 {
        writeln!(file, "    CCMRAM (rwx) : o = 0x10000000, l = {}K", ccmram).unwrap();
    }
    writeln!(file, "    RAM (rwx) : o = 0x20000000, l = {}K", ram).unwrap();
    writeln!(file, "}}").unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
}
