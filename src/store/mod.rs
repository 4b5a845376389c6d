pub mod disk;
pub mod memory;

pub use disk::FjallProfileStore;
pub use memory::MemoryProfileStore;
