//! Disk helpers shared by the storages and the scheme manager: atomic
//! replace through a temporary file, tolerant reads and deletes, and empty
//! directory pruning.
pub mod fs;

#[cfg(test)]
mod tests;
