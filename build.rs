use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CPU_FREQ_HZ: u32 = 16_000_000;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=AVR_I2C_CPU_FREQ_HZ");
    println!("cargo:rerun-if-env-changed=F_CPU");

    // The bus clock is derived from the CPU clock, so it has to be known
    // before the delay loops are laid out.
    let cpu_freq_hz = match env::var("AVR_I2C_CPU_FREQ_HZ").or_else(|_| env::var("F_CPU")) {
        Ok(raw) => parse_frequency(&raw),
        Err(_) => DEFAULT_CPU_FREQ_HZ,
    };

    if cpu_freq_hz == 0 {
        panic!("CPU frequency must be non-zero");
    }

    fs::write(
        out_dir.join("cpu_freq.rs"),
        format!(
            "/// CPU frequency in Hz, fixed at build time.\n\
             pub const CPU_FREQ_HZ: u32 = {};\n",
            cpu_freq_hz
        ),
    )
    .unwrap();
}

// Accepts `16000000`, `16_000_000` and the avr-gcc style `16000000UL`.
fn parse_frequency(raw: &str) -> u32 {
    let digits: String = raw
        .trim()
        .trim_end_matches(|c| c == 'U' || c == 'L' || c == 'u' || c == 'l')
        .chars()
        .filter(|c| *c != '_')
        .collect();

    digits
        .parse()
        .unwrap_or_else(|_| panic!("invalid CPU frequency `{}`", raw))
}
