pub mod bios;
pub mod harness;
pub mod utils;
pub mod vm;
