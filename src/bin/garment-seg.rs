//! Garment segmentation CLI tool
//!
//! Prints one JSON result document per invocation on stdout.

#[cfg(feature = "cli")]
use garment_seg::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
