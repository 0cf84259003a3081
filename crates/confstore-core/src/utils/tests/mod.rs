// Disk helper test module
#[cfg(test)]
mod fs_tests;
