pub mod file_loader;

pub use file_loader::read_optional_bytes;
