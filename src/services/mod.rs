//! Services separating I/O from the segmentation logic

pub mod io;

pub use io::ImageIOService;
